//! Keyed catalogue of [`ServiceEndpoint`] descriptors.
//!
//! Endpoints are registered once at startup under dotted keys such as
//! `census.customer.get` and then read concurrently by every request. The
//! registry is guarded by a [`RwLock`]; descriptors are shared as [`Arc`] so a
//! lookup never clones the descriptor itself.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::endpoint::ServiceEndpoint;
use super::error::RegistryError;

static GLOBAL: LazyLock<Arc<EndpointRegistry>> =
    LazyLock::new(|| Arc::new(EndpointRegistry::new()));

/// Thread-safe map from endpoint key to descriptor.
///
/// # Examples
/// ```
/// use interlink::domain::endpoint::{HttpMethod, ServiceEndpoint};
/// use interlink::domain::endpoint_registry::EndpointRegistry;
///
/// let registry = EndpointRegistry::new();
/// let endpoint = ServiceEndpoint::new("census", "/api/customers/{id}", HttpMethod::Get)
///     .expect("valid endpoint");
/// registry.register("census.customer.get", endpoint).expect("fresh key");
/// assert!(registry.has("census.customer.get"));
/// assert!(registry.register(
///     "census.customer.get",
///     ServiceEndpoint::new("census", "/other", HttpMethod::Get).expect("valid endpoint"),
/// ).is_err());
/// ```
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<BTreeMap<String, Arc<ServiceEndpoint>>>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by code that does not thread its own
    /// instance through. Every call returns a handle to the same registry,
    /// ready to hand to [`ServiceClient::builder`](crate::domain::ServiceClient::builder).
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<ServiceEndpoint>>> {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<ServiceEndpoint>>> {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `endpoint` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyKey`] for a blank key and
    /// [`RegistryError::DuplicateKey`] when the key is already taken.
    pub fn register(
        &self,
        key: impl Into<String>,
        endpoint: ServiceEndpoint,
    ) -> Result<(), RegistryError> {
        let owned_key = key.into();
        if owned_key.trim().is_empty() {
            return Err(RegistryError::EmptyKey);
        }
        let mut endpoints = self.write();
        if endpoints.contains_key(&owned_key) {
            return Err(RegistryError::DuplicateKey { key: owned_key });
        }
        debug!(endpoint_key = %owned_key, service = endpoint.service(), "registered endpoint");
        endpoints.insert(owned_key, Arc::new(endpoint));
        Ok(())
    }

    /// Register a batch of endpoints atomically: either every entry is
    /// inserted or none is.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyKey`] when any key is blank, and
    /// [`RegistryError::DuplicateKeys`] listing every key that collides with
    /// an existing entry or repeats within the batch.
    pub fn bulk_register<I, K>(&self, entries: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = (K, ServiceEndpoint)>,
        K: Into<String>,
    {
        let batch: Vec<(String, ServiceEndpoint)> = entries
            .into_iter()
            .map(|(key, endpoint)| (key.into(), endpoint))
            .collect();
        if batch.iter().any(|(key, _)| key.trim().is_empty()) {
            return Err(RegistryError::EmptyKey);
        }

        let mut endpoints = self.write();
        let mut seen = BTreeSet::new();
        let mut conflicts = Vec::new();
        for (key, _) in &batch {
            let repeated = !seen.insert(key.as_str());
            if (repeated || endpoints.contains_key(key)) && !conflicts.contains(key) {
                conflicts.push(key.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(RegistryError::DuplicateKeys { keys: conflicts });
        }

        let count = batch.len();
        endpoints.extend(
            batch
                .into_iter()
                .map(|(key, endpoint)| (key, Arc::new(endpoint))),
        );
        debug!(count, "registered endpoint batch");
        Ok(())
    }

    /// Look up the descriptor registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEndpoint`] listing every registered
    /// key when `key` is missing.
    pub fn get(&self, key: &str) -> Result<Arc<ServiceEndpoint>, RegistryError> {
        let endpoints = self.read();
        endpoints
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownEndpoint {
                key: key.to_owned(),
                available: endpoints.keys().cloned().collect(),
            })
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Every registered key in sorted order.
    #[must_use]
    pub fn list_keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Every endpoint targeting `service`, keyed by endpoint key.
    #[must_use]
    pub fn list_by_service(&self, service: &str) -> BTreeMap<String, Arc<ServiceEndpoint>> {
        self.read()
            .iter()
            .filter(|(_, endpoint)| endpoint.service() == service)
            .map(|(key, endpoint)| (key.clone(), Arc::clone(endpoint)))
            .collect()
    }

    /// Remove and return the endpoint registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEndpoint`] when `key` is missing.
    pub fn unregister(&self, key: &str) -> Result<Arc<ServiceEndpoint>, RegistryError> {
        let mut endpoints = self.write();
        endpoints
            .remove(key)
            .ok_or_else(|| RegistryError::UnknownEndpoint {
                key: key.to_owned(),
                available: endpoints.keys().cloned().collect(),
            })
    }

    /// Remove every endpoint.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of registered endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry holds no endpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    //! Behavioural coverage for the endpoint registry.
    use super::*;
    use crate::domain::endpoint::HttpMethod;
    use rstest::{fixture, rstest};

    fn endpoint(service: &str, path: &str) -> ServiceEndpoint {
        ServiceEndpoint::new(service, path, HttpMethod::Get).expect("valid endpoint")
    }

    #[fixture]
    fn registry() -> EndpointRegistry {
        let registry = EndpointRegistry::new();
        registry
            .bulk_register([
                ("census.customer.get", endpoint("census", "/api/customers/{id}")),
                ("census.customer.list", endpoint("census", "/api/customers")),
                ("hermes.notify", endpoint("hermes", "/api/notify")),
            ])
            .expect("seed registry");
        registry
    }

    #[rstest]
    fn get_returns_registered_descriptor(registry: EndpointRegistry) {
        let found = registry.get("hermes.notify").expect("registered");
        assert_eq!(found.path(), "/api/notify");
        assert_eq!(registry.len(), 3);
    }

    #[rstest]
    fn duplicate_registration_is_rejected(registry: EndpointRegistry) {
        let err = registry
            .register("hermes.notify", endpoint("hermes", "/v2/notify"))
            .expect_err("duplicate key");
        assert_eq!(
            err,
            RegistryError::DuplicateKey {
                key: "hermes.notify".to_owned()
            }
        );
        assert_eq!(
            registry.get("hermes.notify").expect("still registered").path(),
            "/api/notify"
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_keys_are_rejected(#[case] key: &str) {
        let registry = EndpointRegistry::new();
        assert_eq!(
            registry.register(key, endpoint("census", "/api")),
            Err(RegistryError::EmptyKey)
        );
        assert!(registry.is_empty());
    }

    #[rstest]
    fn missing_key_lists_available_endpoints(registry: EndpointRegistry) {
        let err = registry.get("census.missing").expect_err("unknown key");
        assert_eq!(
            err.to_string(),
            "endpoint 'census.missing' not found. Available endpoints: \
             census.customer.get, census.customer.list, hermes.notify"
        );
    }

    #[test]
    fn missing_key_on_empty_registry_reports_none() {
        let err = EndpointRegistry::new()
            .get("anything")
            .expect_err("empty registry");
        assert!(err.to_string().ends_with("Available endpoints: none"));
    }

    #[rstest]
    fn bulk_register_is_atomic(registry: EndpointRegistry) {
        let err = registry
            .bulk_register([
                ("billing.invoice.get", endpoint("billing", "/api/invoices/{id}")),
                ("hermes.notify", endpoint("hermes", "/api/notify")),
            ])
            .expect_err("collision");
        assert_eq!(
            err,
            RegistryError::DuplicateKeys {
                keys: vec!["hermes.notify".to_owned()]
            }
        );
        assert!(!registry.has("billing.invoice.get"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn bulk_register_rejects_repeats_within_batch() {
        let registry = EndpointRegistry::new();
        let err = registry
            .bulk_register([
                ("a.one", endpoint("a", "/one")),
                ("a.one", endpoint("a", "/two")),
            ])
            .expect_err("repeated key");
        assert_eq!(
            err,
            RegistryError::DuplicateKeys {
                keys: vec!["a.one".to_owned()]
            }
        );
        assert!(registry.is_empty());
    }

    #[rstest]
    fn list_by_service_filters_on_target(registry: EndpointRegistry) {
        let census = registry.list_by_service("census");
        assert_eq!(
            census.keys().map(String::as_str).collect::<Vec<_>>(),
            ["census.customer.get", "census.customer.list"]
        );
        assert!(registry.list_by_service("billing").is_empty());
    }

    #[rstest]
    fn unregister_and_clear_remove_entries(registry: EndpointRegistry) {
        let removed = registry.unregister("hermes.notify").expect("registered");
        assert_eq!(removed.service(), "hermes");
        assert!(matches!(
            registry.unregister("hermes.notify"),
            Err(RegistryError::UnknownEndpoint { .. })
        ));

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.list_keys().is_empty());
    }

    #[test]
    fn concurrent_readers_observe_registered_endpoints() {
        let registry = Arc::new(EndpointRegistry::new());
        registry
            .register("census.customer.get", endpoint("census", "/api/customers/{id}"))
            .expect("register");

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&registry);
                std::thread::spawn(move || shared.get("census.customer.get").is_ok())
            })
            .collect();
        for reader in readers {
            assert!(reader.join().expect("reader thread"));
        }
    }
}

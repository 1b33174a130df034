//! Logical service name to base address resolution.
//!
//! Addresses are declared explicitly at startup, either one at a time through
//! [`ServiceRegistryBuilder`] or in bulk from `<NAME>_BASE_URL` variables via
//! [`ServiceRegistry::from_vars`]. Every address is parsed with [`url::Url`]
//! when declared, so a malformed deployment fails at boot rather than on the
//! first call.
//!
//! Resolved addresses are normalised (trailing `/` removed) and cached per
//! service. Cached entries stay put until [`ServiceRegistry::clear_cache`] is
//! called, even when [`ServiceRegistry::set_address`] replaces the declared
//! value.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;
use url::Url;

use super::error::RegistryError;

/// Suffix marking a variable as a service base address.
pub const BASE_URL_SUFFIX: &str = "_BASE_URL";

/// Thread-safe map from service name to base address.
///
/// Service names are case-insensitive and stored in lower case.
///
/// # Examples
/// ```
/// use interlink::domain::service_registry::ServiceRegistry;
///
/// let registry = ServiceRegistry::builder()
///     .service("census", "http://census:8000/")
///     .build()
///     .expect("valid addresses");
/// assert_eq!(registry.base_url("census").expect("declared"), "http://census:8000");
/// assert!(registry.base_url("billing").is_err());
/// ```
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    declared: RwLock<BTreeMap<String, String>>,
    resolved: RwLock<BTreeMap<String, String>>,
}

/// Collects service declarations before validating them together.
#[derive(Debug, Default)]
pub struct ServiceRegistryBuilder {
    entries: Vec<(String, String)>,
}

impl ServiceRegistryBuilder {
    /// Declare the base address of `service`.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>, address: impl Into<String>) -> Self {
        self.entries.push((service.into(), address.into()));
        self
    }

    /// Validate every declaration and build the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddress`] for the first address that
    /// is not an absolute URL.
    pub fn build(self) -> Result<ServiceRegistry, RegistryError> {
        ServiceRegistry::from_pairs(self.entries)
    }
}

impl ServiceRegistry {
    /// Create a registry with no declared services.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start declaring services.
    #[must_use]
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::default()
    }

    /// Build a registry from `(service, address)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddress`] for the first address that
    /// is not an absolute URL.
    pub fn from_pairs<I, S, A>(pairs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (S, A)>,
        S: Into<String>,
        A: Into<String>,
    {
        let mut declared = BTreeMap::new();
        for (service, address) in pairs {
            let (name, checked) = validate(service.into(), address.into())?;
            declared.insert(name, checked);
        }
        Ok(Self {
            declared: RwLock::new(declared),
            resolved: RwLock::default(),
        })
    }

    /// Build a registry from `NAME_BASE_URL=address` variables, typically
    /// `std::env::vars()`. Matching is case-insensitive; other variables are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddress`] when a matching variable
    /// holds something other than an absolute URL.
    ///
    /// # Examples
    /// ```
    /// use interlink::domain::service_registry::ServiceRegistry;
    ///
    /// let vars = [
    ///     ("CENSUS_BASE_URL", "http://census:8000"),
    ///     ("hermes_base_url", "http://hermes:8000"),
    ///     ("PATH", "/usr/bin"),
    /// ];
    /// let registry = ServiceRegistry::from_vars(vars).expect("valid addresses");
    /// assert_eq!(registry.list_services(), ["census", "hermes"]);
    /// ```
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let pairs: Vec<(String, String)> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                service_from_var(key.as_ref()).map(|service| (service, value.into()))
            })
            .collect();
        Self::from_pairs(pairs)
    }

    /// Resolve the base address of `service`, without a trailing `/`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownService`] listing every declared
    /// service when `service` is not declared.
    pub fn base_url(&self, service: &str) -> Result<String, RegistryError> {
        let name = service.to_ascii_lowercase();
        if let Some(cached) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            return Ok(cached.clone());
        }

        let declared = self.declared.read().unwrap_or_else(PoisonError::into_inner);
        let Some(address) = declared.get(&name) else {
            return Err(RegistryError::UnknownService {
                service: service.to_owned(),
                available: declared.keys().cloned().collect(),
            });
        };
        let normalised = address.trim_end_matches('/').to_owned();
        debug!(service = %name, base_url = %normalised, "resolved service address");
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_insert_with(|| normalised.clone());
        Ok(normalised)
    }

    /// Declared service names in sorted order.
    #[must_use]
    pub fn list_services(&self) -> Vec<String> {
        self.declared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Declare or replace the address of `service`. Does not touch cached
    /// resolutions; call [`Self::clear_cache`] to pick up the change.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddress`] when `address` is not an
    /// absolute URL.
    pub fn set_address(
        &self,
        service: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let (name, checked) = validate(service.into(), address.into())?;
        self.declared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, checked);
        Ok(())
    }

    /// Names of the services with a cached resolution.
    #[must_use]
    pub fn cached_services(&self) -> Vec<String> {
        self.resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Drop every cached resolution.
    pub fn clear_cache(&self) {
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn validate(service: String, address: String) -> Result<(String, String), RegistryError> {
    let name = service.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(RegistryError::InvalidAddress {
            service,
            address,
            message: "service name cannot be empty".to_owned(),
        });
    }
    match Url::parse(address.trim()) {
        Ok(parsed) if parsed.cannot_be_a_base() => Err(RegistryError::InvalidAddress {
            service: name,
            address,
            message: "address cannot be used as a base URL".to_owned(),
        }),
        Ok(_) => Ok((name, address.trim().to_owned())),
        Err(err) => Err(RegistryError::InvalidAddress {
            service: name,
            address,
            message: err.to_string(),
        }),
    }
}

fn service_from_var(key: &str) -> Option<String> {
    let upper = key.to_ascii_uppercase();
    let service = upper.strip_suffix(BASE_URL_SUFFIX)?;
    (!service.is_empty()).then(|| service.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    //! Resolution, caching and validation coverage for the service registry.
    use super::*;
    use rstest::rstest;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::builder()
            .service("census", "http://census:8000/")
            .service("Hermes", "http://hermes:8000")
            .build()
            .expect("valid addresses")
    }

    #[test]
    fn resolution_trims_trailing_slash_and_ignores_case() {
        let registry = registry();
        assert_eq!(
            registry.base_url("census").expect("declared"),
            "http://census:8000"
        );
        assert_eq!(
            registry.base_url("HERMES").expect("declared"),
            "http://hermes:8000"
        );
    }

    #[test]
    fn unknown_service_lists_declared_services() {
        let err = registry().base_url("billing").expect_err("undeclared");
        assert_eq!(
            err.to_string(),
            "service 'billing' is not configured. Available services: census, hermes"
        );
    }

    #[test]
    fn cache_survives_address_updates_until_cleared() {
        let registry = registry();
        assert_eq!(
            registry.base_url("census").expect("declared"),
            "http://census:8000"
        );
        assert_eq!(registry.cached_services(), ["census"]);

        registry
            .set_address("census", "http://census-v2:9000")
            .expect("valid address");
        assert_eq!(
            registry.base_url("census").expect("cached"),
            "http://census:8000"
        );

        registry.clear_cache();
        assert!(registry.cached_services().is_empty());
        assert_eq!(
            registry.base_url("census").expect("declared"),
            "http://census-v2:9000"
        );
    }

    #[rstest]
    #[case::not_a_url("census", "census:8000/api")]
    #[case::relative("census", "/api")]
    #[case::blank_name(" ", "http://census:8000")]
    fn invalid_declarations_are_rejected(#[case] service: &str, #[case] address: &str) {
        let err = ServiceRegistry::from_pairs([(service, address)]).expect_err("invalid");
        assert!(
            matches!(err, RegistryError::InvalidAddress { .. }),
            "unexpected error: {err}"
        );
    }

    #[rstest]
    #[case("CENSUS_BASE_URL", Some("census"))]
    #[case("census_base_url", Some("census"))]
    #[case("_BASE_URL", None)]
    #[case("CENSUS_URL", None)]
    fn variables_map_to_service_names(#[case] key: &str, #[case] expected: Option<&str>) {
        assert_eq!(service_from_var(key).as_deref(), expected);
    }

    #[test]
    fn from_vars_rejects_malformed_addresses() {
        let err = ServiceRegistry::from_vars([("CENSUS_BASE_URL", "not a url")])
            .expect_err("malformed");
        assert!(matches!(
            err,
            RegistryError::InvalidAddress { ref service, .. } if service == "census"
        ));
    }
}

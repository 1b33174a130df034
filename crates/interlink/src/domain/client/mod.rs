//! Typed HTTP client for calling other services by endpoint key.
//!
//! A call resolves the endpoint descriptor and the target's base address,
//! substitutes path parameters, attaches the caller's trace identifier,
//! dispatches through the [`HttpTransport`] port under a timeout, classifies
//! the outcome into [`ServiceError`] variants, and writes correlation events
//! through the [`EventSink`] port.
//!
//! The trace identifier is forwarded verbatim: the receiving service appends
//! its own segment at its inbound boundary.

mod reply;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

pub use self::reply::{Reply, RequestBody};
use super::endpoint::{ServiceEndpoint, placeholders_in};
use super::endpoint_registry::EndpointRegistry;
use super::error::{RegistryError, ServiceError, ValidationStage, millis};
use super::events::{EventLevel, StructuredEvent};
use super::ports::{
    DiscardEventSink, EventSink, HttpTransport, TransportError, TransportRequest,
    TransportResponse,
};
use super::service_registry::ServiceRegistry;
use super::trace::{SERVICE_NAME_HEADER, TRACE_ID_HEADER, current_trace_id};

/// Timeout applied when neither the endpoint nor the builder sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters of an error body quoted in [`ServiceError::Http`].
const ERROR_MESSAGE_BODY_CHARS: usize = 200;
/// Characters of an error body written to the error event.
const ERROR_LOG_BODY_CHARS: usize = 500;

/// Path or query parameters as `(name, value)` pairs.
pub type Params<'a> = &'a [(&'a str, &'a str)];

/// Client for calling downstream services through registered endpoints.
///
/// Cheap to clone; clones share registries, transport and sink.
#[derive(Clone)]
pub struct ServiceClient {
    endpoints: Arc<EndpointRegistry>,
    services: Arc<ServiceRegistry>,
    transport: Arc<dyn HttpTransport>,
    sink: Arc<dyn EventSink>,
    default_timeout: Duration,
    service_name: Option<String>,
}

/// Builder for [`ServiceClient`].
pub struct ServiceClientBuilder {
    endpoints: Arc<EndpointRegistry>,
    services: Arc<ServiceRegistry>,
    transport: Arc<dyn HttpTransport>,
    sink: Arc<dyn EventSink>,
    default_timeout: Duration,
    service_name: Option<String>,
}

impl ServiceClientBuilder {
    /// Write correlation events to `sink` instead of discarding them.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Timeout for endpoints that do not declare their own.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Name this service announces in the `X-Service-Name` header.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ServiceClient {
        ServiceClient {
            endpoints: self.endpoints,
            services: self.services,
            transport: self.transport,
            sink: self.sink,
            default_timeout: self.default_timeout,
            service_name: self.service_name,
        }
    }
}

/// Per-call facts shared by every event and error of one request.
struct Call<'a> {
    key: &'a str,
    endpoint: &'a ServiceEndpoint,
    url: String,
    timeout: Duration,
}

impl Call<'_> {
    fn peer(&self) -> &str {
        self.endpoint.service()
    }

    fn method(&self) -> &'static str {
        self.endpoint.method().as_str()
    }
}

impl ServiceClient {
    /// Start building a client over the given registries and transport.
    #[must_use]
    pub fn builder(
        endpoints: Arc<EndpointRegistry>,
        services: Arc<ServiceRegistry>,
        transport: Arc<dyn HttpTransport>,
    ) -> ServiceClientBuilder {
        ServiceClientBuilder {
            endpoints,
            services,
            transport,
            sink: Arc::new(DiscardEventSink),
            default_timeout: DEFAULT_TIMEOUT,
            service_name: None,
        }
    }

    /// Timeout used for endpoints without an override.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Concrete URL for `endpoint` with `path_params` substituted.
    ///
    /// Each `{name}` placeholder is replaced by the matching parameter.
    /// Parameters with no placeholder and placeholders with no parameter are
    /// logged as warnings; neither fails the call.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownService`] when the endpoint's service
    /// has no declared address.
    pub fn build_url(
        &self,
        endpoint: &ServiceEndpoint,
        path_params: Params<'_>,
    ) -> Result<String, RegistryError> {
        let base = self.services.base_url(endpoint.service())?;
        let mut path = endpoint.path().to_owned();
        for (name, value) in path_params {
            let placeholder = format!("{{{name}}}");
            if path.contains(&placeholder) {
                path = path.replace(&placeholder, value);
            } else {
                warn!(
                    parameter = name,
                    path = endpoint.path(),
                    "path parameter not found in endpoint path"
                );
            }
        }
        let unreplaced: Vec<&str> = placeholders_in(&path).collect();
        if !unreplaced.is_empty() {
            warn!(
                path = %path,
                placeholders = ?unreplaced,
                "endpoint path contains unreplaced parameters"
            );
        }
        Ok(format!("{base}{path}"))
    }

    fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_owned(), "application/json".to_owned());
        headers.insert("Accept".to_owned(), "application/json".to_owned());
        if let Some(trace_id) = current_trace_id() {
            headers.insert(TRACE_ID_HEADER.to_owned(), trace_id.to_string());
        }
        if let Some(name) = &self.service_name {
            headers.insert(SERVICE_NAME_HEADER.to_owned(), name.clone());
        }
        headers
    }

    /// Call the endpoint registered under `endpoint_key`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Configuration`] for an unknown endpoint key or
    ///   service; nothing is sent.
    /// - [`ServiceError::Validation`] when `body` is given for a method that
    ///   carries none or does not match the declared request schema (nothing
    ///   is sent), or when the reply does not match the declared response
    ///   schema.
    /// - [`ServiceError::NotFound`], [`ServiceError::Unavailable`] and
    ///   [`ServiceError::Http`] for 404, 5xx and other non-2xx statuses.
    /// - [`ServiceError::Timeout`] when the effective timeout elapses.
    /// - [`ServiceError::Transport`] for any other transport failure.
    pub async fn request(
        &self,
        endpoint_key: &str,
        path_params: Params<'_>,
        query_params: Params<'_>,
        body: Option<RequestBody>,
    ) -> Result<Reply, ServiceError> {
        let endpoint = self.endpoints.get(endpoint_key)?;
        let call = Call {
            key: endpoint_key,
            endpoint: &endpoint,
            url: self.build_url(&endpoint, path_params)?,
            timeout: endpoint.timeout().unwrap_or(self.default_timeout),
        };
        if body.is_some() && !endpoint.method().carries_body() {
            warn!(endpoint_key, method = call.method(), "request body rejected before dispatch");
            return Err(ServiceError::Validation {
                endpoint: endpoint_key.to_owned(),
                stage: ValidationStage::Request,
                message: format!("{} requests do not carry a body", call.method()),
                failures: Vec::new(),
            });
        }
        if let (Some(candidate), Some(schema)) = (&body, endpoint.request_schema()) {
            if let Err((message, failures)) = candidate.check(schema) {
                warn!(endpoint_key, %message, "request body rejected before dispatch");
                return Err(ServiceError::Validation {
                    endpoint: endpoint_key.to_owned(),
                    stage: ValidationStage::Request,
                    message,
                    failures,
                });
            }
        }

        let request = TransportRequest {
            method: endpoint.method(),
            url: call.url.clone(),
            query: query_params
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
            headers: self.headers(),
            body: body.map(RequestBody::into_value),
            timeout: call.timeout,
        };

        let mut request_event =
            StructuredEvent::client_request(call.peer(), call.method(), &call.url, call.key);
        if !query_params.is_empty() {
            request_event = request_event.with_field("params", params_json(query_params));
        }
        self.sink.emit(&request_event);

        let started = Instant::now();
        let response = match tokio::time::timeout(call.timeout, self.transport.send(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(source)) if source.is_timeout() => return Err(self.timed_out(&call)),
            Ok(Err(source)) => return Err(self.transport_failed(&call, source)),
            Err(_elapsed) => return Err(self.timed_out(&call)),
        };
        let elapsed = started.elapsed();

        self.classify(&call, response, elapsed)
    }

    fn classify(
        &self,
        call: &Call<'_>,
        response: TransportResponse,
        elapsed: Duration,
    ) -> Result<Reply, ServiceError> {
        let status = response.status;
        if status == 404 {
            let err = ServiceError::NotFound {
                endpoint: call.key.to_owned(),
                url: call.url.clone(),
            };
            self.emit_error(call, &err, EventLevel::Warn, |event| event.with_status(status));
            return Err(err);
        }
        if status >= 500 {
            let err = ServiceError::Unavailable {
                endpoint: call.key.to_owned(),
                url: call.url.clone(),
                status,
            };
            self.emit_error(call, &err, EventLevel::Error, |event| event.with_status(status));
            return Err(err);
        }
        if !(200..300).contains(&status) {
            let text = String::from_utf8_lossy(&response.body);
            let err = ServiceError::Http {
                endpoint: call.key.to_owned(),
                url: call.url.clone(),
                status,
                body: preview(&text, ERROR_MESSAGE_BODY_CHARS),
            };
            let logged_body = preview(&text, ERROR_LOG_BODY_CHARS);
            self.emit_error(call, &err, EventLevel::Error, |event| {
                event
                    .with_status(status)
                    .with_field("response_body", logged_body)
            });
            return Err(err);
        }

        self.sink.emit(&StructuredEvent::client_response(
            call.peer(),
            call.method(),
            &call.url,
            call.key,
            status,
            elapsed,
        ));

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Reply::new(call.key.to_owned(), status, None));
        }
        let document = self.decode(call, &response.body)?;
        Ok(Reply::new(call.key.to_owned(), status, Some(document)))
    }

    fn decode(&self, call: &Call<'_>, body: &[u8]) -> Result<Value, ServiceError> {
        let (message, failures) = match serde_json::from_slice::<Value>(body) {
            Ok(document) => match call.endpoint.response_schema() {
                None => return Ok(document),
                Some(schema) => match schema.validate(&document) {
                    Ok(()) => return Ok(document),
                    Err(failures) => (
                        format!("response does not match {}", schema.type_name()),
                        failures,
                    ),
                },
            },
            Err(error) => (
                "response body is not valid JSON".to_owned(),
                vec![error.to_string()],
            ),
        };
        let validation_errors = json!(failures);
        let err = ServiceError::Validation {
            endpoint: call.key.to_owned(),
            stage: ValidationStage::Response,
            message,
            failures,
        };
        self.emit_error(call, &err, EventLevel::Error, |event| {
            event.with_field("validation_errors", validation_errors)
        });
        Err(err)
    }

    fn timed_out(&self, call: &Call<'_>) -> ServiceError {
        let err = ServiceError::Timeout {
            endpoint: call.key.to_owned(),
            url: call.url.clone(),
            timeout: call.timeout,
        };
        self.emit_error(call, &err, EventLevel::Error, |event| {
            event.with_field("timeout_ms", millis(call.timeout))
        });
        err
    }

    fn transport_failed(&self, call: &Call<'_>, source: TransportError) -> ServiceError {
        let kind = source.kind();
        let err = ServiceError::Transport {
            endpoint: call.key.to_owned(),
            url: call.url.clone(),
            source,
        };
        self.emit_error(call, &err, EventLevel::Error, |event| {
            event.with_field("transport_error", kind)
        });
        err
    }

    fn emit_error(
        &self,
        call: &Call<'_>,
        err: &ServiceError,
        level: EventLevel,
        decorate: impl FnOnce(StructuredEvent) -> StructuredEvent,
    ) {
        let event = StructuredEvent::client_error(
            call.peer(),
            call.method(),
            &call.url,
            call.key,
            err.to_string(),
            err.error_type(),
        )
        .with_level(level);
        self.sink.emit(&decorate(event));
    }

    /// `GET` the endpoint.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get(
        &self,
        endpoint_key: &str,
        path_params: Params<'_>,
        query_params: Params<'_>,
    ) -> Result<Reply, ServiceError> {
        self.request(endpoint_key, path_params, query_params, None)
            .await
    }

    /// `DELETE` through the endpoint.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn delete(
        &self,
        endpoint_key: &str,
        path_params: Params<'_>,
        query_params: Params<'_>,
    ) -> Result<Reply, ServiceError> {
        self.request(endpoint_key, path_params, query_params, None)
            .await
    }

    /// `POST` `body` to the endpoint.
    ///
    /// # Errors
    ///
    /// See [`Self::request`]. A body that cannot be serialised is reported as
    /// a request-stage [`ServiceError::Validation`].
    pub async fn post<T>(
        &self,
        endpoint_key: &str,
        body: &T,
        path_params: Params<'_>,
        query_params: Params<'_>,
    ) -> Result<Reply, ServiceError>
    where
        T: Serialize + Sync + 'static,
    {
        let payload = encode_body(endpoint_key, body)?;
        self.request(endpoint_key, path_params, query_params, Some(payload))
            .await
    }

    /// `PUT` `body` to the endpoint.
    ///
    /// # Errors
    ///
    /// See [`Self::post`].
    pub async fn put<T>(
        &self,
        endpoint_key: &str,
        body: &T,
        path_params: Params<'_>,
        query_params: Params<'_>,
    ) -> Result<Reply, ServiceError>
    where
        T: Serialize + Sync + 'static,
    {
        let payload = encode_body(endpoint_key, body)?;
        self.request(endpoint_key, path_params, query_params, Some(payload))
            .await
    }

    /// `PATCH` `body` to the endpoint.
    ///
    /// # Errors
    ///
    /// See [`Self::post`].
    pub async fn patch<T>(
        &self,
        endpoint_key: &str,
        body: &T,
        path_params: Params<'_>,
        query_params: Params<'_>,
    ) -> Result<Reply, ServiceError>
    where
        T: Serialize + Sync + 'static,
    {
        let payload = encode_body(endpoint_key, body)?;
        self.request(endpoint_key, path_params, query_params, Some(payload))
            .await
    }
}

fn encode_body<T>(endpoint_key: &str, body: &T) -> Result<RequestBody, ServiceError>
where
    T: Serialize + 'static,
{
    RequestBody::json(body).map_err(|error| ServiceError::Validation {
        endpoint: endpoint_key.to_owned(),
        stage: ValidationStage::Request,
        message: "request body cannot be serialised".to_owned(),
        failures: vec![error.to_string()],
    })
}

fn params_json(params: Params<'_>) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(name, value)| ((*name).to_owned(), json!(value)))
            .collect(),
    )
}

/// First `limit` characters of `text`.
fn preview(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

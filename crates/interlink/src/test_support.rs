//! Test doubles for code that calls other services.
//!
//! Compiled for this crate's unit tests and, through the `test-support`
//! feature, for integration tests and downstream crates. The stub transport
//! answers by `(method, url)` so tests can stub an endpoint without a network;
//! the recording sink keeps every correlation event for assertions.
//! [`CapturedLogs`] collects JSON formatted `tracing` output.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Dispatch;

use crate::domain::endpoint::{HttpMethod, ServiceEndpoint};
use crate::domain::error::RegistryError;
use crate::domain::events::StructuredEvent;
use crate::domain::ports::{
    EventSink, HttpTransport, TransportError, TransportRequest, TransportResponse,
};
use crate::domain::service_registry::ServiceRegistry;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Stub {
    delay: Option<Duration>,
    outcome: Result<TransportResponse, TransportError>,
}

/// In-memory [`HttpTransport`] answering registered `(method, url)` pairs.
///
/// Requests without a registered answer fail with
/// [`TransportError::Connection`].
///
/// # Examples
/// ```
/// use interlink::domain::endpoint::HttpMethod;
/// use interlink::domain::ports::{HttpTransport, TransportRequest};
/// use interlink::test_support::StubHttpTransport;
/// use serde_json::json;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let transport = StubHttpTransport::new();
/// transport.respond_json(HttpMethod::Get, "http://census/api/ping", 200, &json!({"ok": true}));
///
/// let request = TransportRequest {
///     method: HttpMethod::Get,
///     url: "http://census/api/ping".to_owned(),
///     query: Vec::new(),
///     headers: Default::default(),
///     body: None,
///     timeout: std::time::Duration::from_secs(1),
/// };
/// let response = transport.send(request).await.expect("stubbed");
/// assert_eq!(response.status, 200);
/// assert_eq!(transport.requests().len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct StubHttpTransport {
    stubs: Mutex<HashMap<(HttpMethod, String), Stub>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl StubHttpTransport {
    /// Transport with no registered answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stub(&self, method: HttpMethod, url: impl Into<String>, stub: Stub) {
        lock(&self.stubs).insert((method, url.into()), stub);
    }

    /// Answer `method url` with `response`.
    pub fn respond(&self, method: HttpMethod, url: impl Into<String>, response: TransportResponse) {
        self.stub(
            method,
            url,
            Stub {
                delay: None,
                outcome: Ok(response),
            },
        );
    }

    /// Answer `method url` with `status` and a JSON body.
    pub fn respond_json(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        status: u16,
        body: &Value,
    ) {
        self.respond(method, url, TransportResponse::json(status, body));
    }

    /// Answer `method url` with `response` after `delay`.
    pub fn respond_after(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        delay: Duration,
        response: TransportResponse,
    ) {
        self.stub(
            method,
            url,
            Stub {
                delay: Some(delay),
                outcome: Ok(response),
            },
        );
    }

    /// Fail `method url` with `error`.
    pub fn fail(&self, method: HttpMethod, url: impl Into<String>, error: TransportError) {
        self.stub(
            method,
            url,
            Stub {
                delay: None,
                outcome: Err(error),
            },
        );
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        lock(&self.requests).clone()
    }

    /// The most recent request, if any.
    #[must_use]
    pub fn last_request(&self) -> Option<TransportRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl HttpTransport for StubHttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let key = (request.method, request.url.clone());
        lock(&self.requests).push(request);
        let stub = lock(&self.stubs).get(&key).cloned();
        let Some(found) = stub else {
            return Err(TransportError::connection(format!(
                "no stub registered for {} {}",
                key.0, key.1
            )));
        };
        if let Some(delay) = found.delay {
            tokio::time::sleep(delay).await;
        }
        found.outcome
    }
}

/// [`EventSink`] that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<StructuredEvent>>,
}

impl RecordingEventSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<StructuredEvent> {
        lock(&self.events).clone()
    }

    /// Names of the recorded events, in emission order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(StructuredEvent::name).collect()
    }

    /// First recorded event called `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<StructuredEvent> {
        lock(&self.events)
            .iter()
            .find(|event| event.name() == name)
            .cloned()
    }

    /// Forget every recorded event.
    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &StructuredEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Stub the concrete URL `endpoint` resolves to with a JSON answer.
///
/// The URL is built the same way the service client builds it: the
/// service's base address followed by the path with `path_params`
/// substituted.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownService`] when `services` has no address
/// for the endpoint's service.
pub fn mock_endpoint(
    transport: &StubHttpTransport,
    services: &ServiceRegistry,
    endpoint: &ServiceEndpoint,
    path_params: &[(&str, &str)],
    status: u16,
    body: Option<&Value>,
) -> Result<String, RegistryError> {
    let base = services.base_url(endpoint.service())?;
    let path = path_params
        .iter()
        .fold(endpoint.path().to_owned(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        });
    let url = format!("{base}{path}");
    let response = body.map_or_else(
        || TransportResponse::new(status),
        |document| TransportResponse::json(status, document),
    );
    transport.respond(endpoint.method(), url.clone(), response);
    Ok(url)
}

/// In-memory log buffer fed by a JSON `tracing` subscriber.
///
/// Events are flattened, so an event's fields and `message` sit at the top
/// level of each line. The current span is under `span` and the full span
/// stack under `spans`.
///
/// # Examples
/// ```
/// use interlink::test_support::CapturedLogs;
///
/// let logs = CapturedLogs::default();
/// tracing::dispatcher::with_default(&logs.json_dispatch(), || {
///     tracing::info!(peer = "census", "calling peer");
/// });
/// let line = logs.find("calling peer").expect("captured");
/// assert_eq!(line["peer"], "census");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Dispatcher writing JSON lines into this buffer.
    #[must_use]
    pub fn json_dispatch(&self) -> Dispatch {
        let writer = self.clone();
        Dispatch::new(
            tracing_subscriber::fmt()
                .json()
                .flatten_event(true)
                .with_writer(move || writer.clone())
                .finish(),
        )
    }

    /// Every captured line that parses as JSON, in write order.
    #[must_use]
    pub fn lines(&self) -> Vec<Value> {
        let bytes = lock(&self.0).clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// First captured line whose message is `message`.
    #[must_use]
    pub fn find(&self, message: &str) -> Option<Value> {
        self.lines()
            .into_iter()
            .find(|line| line.get("message").and_then(Value::as_str) == Some(message))
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

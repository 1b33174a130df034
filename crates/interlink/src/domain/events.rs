//! Structured correlation events for inbound and outbound HTTP traffic.
//!
//! Every event names the peer service and carries the trace identifier bound
//! to the emitting chain, so log lines from different services can be joined
//! on `trace_id`. Events are immutable once built; the `with_*` methods
//! consume and return the event.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::error::millis;
use super::trace::{TraceId, current_trace_id};

/// Which side of the service boundary the traffic crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traffic arriving at this service.
    Inbound,
    /// Traffic leaving this service.
    Outbound,
}

impl Direction {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Severity an event is written at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
    /// Normal traffic.
    Info,
    /// Expected but noteworthy outcomes such as a missing resource.
    Warn,
    /// Failed exchanges.
    Error,
}

/// The six event kinds of the correlation schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// Outbound call about to be dispatched.
    #[serde(rename = "http.client.request")]
    ClientRequest,
    /// Outbound call answered successfully.
    #[serde(rename = "http.client.response")]
    ClientResponse,
    /// Outbound call failed after dispatch.
    #[serde(rename = "http.client.error")]
    ClientError,
    /// Inbound request received.
    #[serde(rename = "http.server.request")]
    ServerRequest,
    /// Inbound request completed.
    #[serde(rename = "http.server.response")]
    ServerResponse,
    /// Inbound request handling failed.
    #[serde(rename = "http.server.error")]
    ServerError,
}

impl EventKind {
    /// Dotted event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientRequest => "http.client.request",
            Self::ClientResponse => "http.client.response",
            Self::ClientError => "http.client.error",
            Self::ServerRequest => "http.server.request",
            Self::ServerResponse => "http.server.response",
            Self::ServerError => "http.server.error",
        }
    }

    /// Direction implied by the kind: requests leave the client and arrive at
    /// the server, responses and errors travel the other way.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::ClientRequest | Self::ServerResponse | Self::ServerError => Direction::Outbound,
            Self::ClientResponse | Self::ClientError | Self::ServerRequest => Direction::Inbound,
        }
    }
}

/// One structured log record describing a request, response or failure.
///
/// Serialises to
/// `{name, direction, peer_service, method, url | path, url_name,
/// status_code?, duration_ms?, error?, error_type?, trace_id?, ...extra}`.
///
/// # Examples
/// ```
/// use interlink::domain::events::{Direction, StructuredEvent};
///
/// let event = StructuredEvent::client_request(
///     "census",
///     "GET",
///     "http://census/api/customers/42",
///     "census.customer.get",
/// );
/// assert_eq!(event.name(), "http.client.request");
/// assert_eq!(event.direction(), Direction::Outbound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredEvent {
    #[serde(rename = "name")]
    kind: EventKind,
    direction: Direction,
    peer_service: String,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    url_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<TraceId>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
    #[serde(skip)]
    level: EventLevel,
}

impl StructuredEvent {
    fn new(
        kind: EventKind,
        peer_service: impl Into<String>,
        method: impl Into<String>,
        url_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            direction: kind.direction(),
            peer_service: peer_service.into(),
            method: method.into(),
            url: None,
            path: None,
            url_name: url_name.into(),
            status_code: None,
            duration_ms: None,
            error: None,
            error_type: None,
            trace_id: current_trace_id(),
            extra: BTreeMap::new(),
            level: EventLevel::Info,
        }
    }

    /// `http.client.request`: an outbound call is about to be dispatched.
    #[must_use]
    pub fn client_request(
        peer_service: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        url_name: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::ClientRequest, peer_service, method, url_name).with_url(url)
    }

    /// `http.client.response`: an outbound call completed. Escalates to
    /// [`EventLevel::Error`] for statuses of 400 and above.
    #[must_use]
    pub fn client_response(
        peer_service: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        url_name: impl Into<String>,
        status_code: u16,
        duration: Duration,
    ) -> Self {
        Self::new(EventKind::ClientResponse, peer_service, method, url_name)
            .with_url(url)
            .with_outcome(status_code, duration)
    }

    /// `http.client.error`: an outbound call failed after dispatch.
    #[must_use]
    pub fn client_error(
        peer_service: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        url_name: impl Into<String>,
        error: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::ClientError, peer_service, method, url_name)
            .with_url(url)
            .with_error(error, error_type)
    }

    /// `http.server.request`: an inbound request arrived.
    #[must_use]
    pub fn server_request(
        peer_service: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        url_name: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::ServerRequest, peer_service, method, url_name).with_path(path)
    }

    /// `http.server.response`: an inbound request completed. Escalates to
    /// [`EventLevel::Error`] for statuses of 400 and above.
    #[must_use]
    pub fn server_response(
        peer_service: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        url_name: impl Into<String>,
        status_code: u16,
        duration: Duration,
    ) -> Self {
        Self::new(EventKind::ServerResponse, peer_service, method, url_name)
            .with_path(path)
            .with_outcome(status_code, duration)
    }

    /// `http.server.error`: handling an inbound request failed.
    #[must_use]
    pub fn server_error(
        peer_service: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        url_name: impl Into<String>,
        error: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::ServerError, peer_service, method, url_name)
            .with_path(path)
            .with_error(error, error_type)
    }

    fn with_outcome(self, status_code: u16, duration: Duration) -> Self {
        let level = if status_code >= 400 {
            EventLevel::Error
        } else {
            EventLevel::Info
        };
        Self {
            status_code: Some(status_code),
            duration_ms: Some(millis(duration)),
            level,
            ..self
        }
    }

    fn with_error(self, error: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_type: Some(error_type.into()),
            level: EventLevel::Error,
            ..self
        }
    }

    fn with_path(self, path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..self
        }
    }

    /// Return a copy with the full URL recorded.
    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..self
        }
    }

    /// Return a copy with the status code recorded without changing the
    /// level.
    #[must_use]
    pub fn with_status(self, status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            ..self
        }
    }

    /// Return a copy with the severity overridden.
    #[must_use]
    pub fn with_level(self, level: EventLevel) -> Self {
        Self { level, ..self }
    }

    /// Return a copy carrying an additional field, such as query parameters
    /// or a user identifier. Schema keys cannot be shadowed.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = name.into();
        if !is_schema_key(&key) {
            self.extra.insert(key, value.into());
        }
        self
    }

    /// Dotted event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Traffic direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Counterpart service name.
    #[must_use]
    pub fn peer_service(&self) -> &str {
        &self.peer_service
    }

    /// HTTP method of the exchange.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full URL (client events).
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Request path (server events).
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Logical route or endpoint key.
    #[must_use]
    pub fn url_name(&self) -> &str {
        &self.url_name
    }

    /// Response status, when known.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Elapsed time in milliseconds, when measured.
    #[must_use]
    pub const fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Error message, for error events.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Error category, for error events.
    #[must_use]
    pub fn error_type(&self) -> Option<&str> {
        self.error_type.as_deref()
    }

    /// Trace identifier bound when the event was built.
    #[must_use]
    pub const fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Additional fields.
    #[must_use]
    pub const fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// Severity.
    #[must_use]
    pub const fn level(&self) -> EventLevel {
        self.level
    }
}

const SCHEMA_KEYS: [&str; 12] = [
    "name",
    "direction",
    "peer_service",
    "method",
    "url",
    "path",
    "url_name",
    "status_code",
    "duration_ms",
    "error",
    "error_type",
    "trace_id",
];

fn is_schema_key(key: &str) -> bool {
    SCHEMA_KEYS.contains(&key)
}

/// Derive the logical route name used by server events: the leading `/` is
/// dropped and remaining separators become `.`; the bare root is `root`.
///
/// # Examples
/// ```
/// use interlink::domain::events::url_name_for_path;
///
/// assert_eq!(url_name_for_path("/api/users/42"), "api.users.42");
/// assert_eq!(url_name_for_path("/"), "root");
/// ```
#[must_use]
pub fn url_name_for_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        "root".to_owned()
    } else {
        trimmed.replace('/', ".")
    }
}

//! Driven port for performing one HTTP exchange.
//!
//! The service client owns URL construction, trace headers, classification
//! and logging; a transport only moves bytes. Connection pooling, TLS and DNS
//! belong to the adapter.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::define_port_error;
use crate::domain::endpoint::HttpMethod;

/// One fully resolved outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// HTTP method to use.
    pub method: HttpMethod,
    /// Absolute URL without the query string.
    pub url: String,
    /// Query string parameters in caller order.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Optional JSON body.
    pub body: Option<Value>,
    /// Upper bound the adapter should apply to the exchange.
    pub timeout: Duration,
}

impl TransportRequest {
    /// Look up a request header case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Raw response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Response with the given status and an empty body.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Response with the given status and a JSON body.
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_owned(), "application/json".to_owned());
        Self {
            status,
            headers,
            body: body.to_string().into_bytes(),
        }
    }

    /// Look up a response header case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

define_port_error! {
    /// Errors surfaced by a transport before a response was received.
    pub enum TransportError {
        /// The exchange exceeded its timeout.
        Timeout {
            /// Adapter diagnostic.
            message: String,
        } => "transport timed out: {message}",
        /// Connecting, sending or reading failed.
        Connection {
            /// Adapter diagnostic.
            message: String,
        } => "transport failed: {message}",
        /// The adapter could not express the request.
        InvalidRequest {
            /// Adapter diagnostic.
            message: String,
        } => "transport rejected request: {message}",
    }
}

impl TransportError {
    /// Whether the failure is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Stable category label used in structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::InvalidRequest { .. } => "invalid_request",
        }
    }
}

/// Port for dispatching an HTTP request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one exchange.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be obtained. Non-2xx
    /// statuses are not errors at this level.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

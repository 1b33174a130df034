//! Error taxonomy for registries and outbound service calls.
//!
//! These errors are transport agnostic. The inbound HTTP adapter maps
//! [`ServiceError`] onto status codes and JSON bodies; callers branch on the
//! variants (for example "resource absent" versus "call failed").

use std::time::Duration;

use serde_json::{Map, Value, json};
use thiserror::Error;

use super::endpoint::EndpointValidationError;
use super::ports::TransportError;

/// Deployment or programming defects in registry contents or lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A registry key was blank.
    #[error("endpoint key cannot be empty")]
    EmptyKey,
    /// The key is already registered.
    #[error("endpoint '{key}' is already registered")]
    DuplicateKey {
        /// The conflicting key.
        key: String,
    },
    /// A bulk registration collided with existing keys; nothing was
    /// registered.
    #[error("cannot register endpoints: already registered: {}", .keys.join(", "))]
    DuplicateKeys {
        /// Every conflicting key in the batch.
        keys: Vec<String>,
    },
    /// No endpoint is registered under the key.
    #[error("endpoint '{key}' not found. Available endpoints: {}", list_or_none(.available))]
    UnknownEndpoint {
        /// The key that was looked up.
        key: String,
        /// Keys registered at the time of the lookup.
        available: Vec<String>,
    },
    /// No base address is declared for the service.
    #[error(
        "service '{service}' is not configured. Available services: {}",
        list_or_none(.available)
    )]
    UnknownService {
        /// The service that was looked up.
        service: String,
        /// Services declared at the time of the lookup.
        available: Vec<String>,
    },
    /// A declared base address is not an absolute URL.
    #[error("base address '{address}' for service '{service}' is invalid: {message}")]
    InvalidAddress {
        /// The service the address was declared for.
        service: String,
        /// The rejected address.
        address: String,
        /// Parser diagnostic.
        message: String,
    },
    /// An endpoint descriptor failed validation.
    #[error(transparent)]
    InvalidEndpoint(#[from] EndpointValidationError),
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_owned()
    } else {
        items.join(", ")
    }
}

/// Which side of a call failed schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    /// The caller supplied a body of the wrong type.
    Request,
    /// The downstream service answered with a document that does not match
    /// the declared response schema.
    Response,
}

impl ValidationStage {
    /// Stable lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

/// Failure of one outbound call made through the service client.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown endpoint key, unresolvable service, or invalid registry
    /// content. Never retried; no network access was attempted.
    #[error(transparent)]
    Configuration(#[from] RegistryError),
    /// Request body or response document did not match the declared schema.
    #[error("{} validation failed for '{endpoint}': {message}", .stage.as_str())]
    Validation {
        /// Endpoint key of the call.
        endpoint: String,
        /// Which side failed.
        stage: ValidationStage,
        /// Summary of the mismatch.
        message: String,
        /// Individual validation failures.
        failures: Vec<String>,
    },
    /// The downstream service answered 404.
    #[error("resource not found at {url}")]
    NotFound {
        /// Endpoint key of the call.
        endpoint: String,
        /// Concrete URL that was requested.
        url: String,
    },
    /// The call did not complete within the effective timeout.
    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Endpoint key of the call.
        endpoint: String,
        /// Concrete URL that was requested.
        url: String,
        /// Effective timeout that elapsed.
        timeout: Duration,
    },
    /// The downstream service answered with a 5xx status.
    #[error("service unavailable: HTTP {status}")]
    Unavailable {
        /// Endpoint key of the call.
        endpoint: String,
        /// Concrete URL that was requested.
        url: String,
        /// Status code returned.
        status: u16,
    },
    /// Any other non-2xx status.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// Endpoint key of the call.
        endpoint: String,
        /// Concrete URL that was requested.
        url: String,
        /// Status code returned.
        status: u16,
        /// Response body truncated for diagnostics.
        body: String,
    },
    /// The transport failed before a response was received.
    #[error("request failed: {source}")]
    Transport {
        /// Endpoint key of the call.
        endpoint: String,
        /// Concrete URL that was requested.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

impl ServiceError {
    /// Endpoint key of the failed call, when one was resolved.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Configuration(_) => None,
            Self::Validation { endpoint, .. }
            | Self::NotFound { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::Unavailable { endpoint, .. }
            | Self::Http { endpoint, .. }
            | Self::Transport { endpoint, .. } => Some(endpoint),
        }
    }

    /// HTTP status returned by the downstream service, if any.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Unavailable { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::Configuration(_)
            | Self::Validation { .. }
            | Self::Timeout { .. }
            | Self::Transport { .. } => None,
        }
    }

    /// Stable machine-readable category.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "service_unavailable",
            Self::Http { .. } => "service_error",
            Self::Transport { .. } => "transport_error",
        }
    }

    /// Structured diagnostic fields for logs and error payloads.
    #[must_use]
    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        if let Some(endpoint) = self.endpoint() {
            details.insert("endpoint_key".to_owned(), json!(endpoint));
        }
        if let Some(status) = self.status_code() {
            details.insert("status_code".to_owned(), json!(status));
        }
        match self {
            Self::Validation {
                stage, failures, ..
            } => {
                details.insert("stage".to_owned(), json!(stage.as_str()));
                details.insert("validation_errors".to_owned(), json!(failures));
            }
            Self::NotFound { url, .. } | Self::Unavailable { url, .. } => {
                details.insert("url".to_owned(), json!(url));
            }
            Self::Timeout { url, timeout, .. } => {
                details.insert("url".to_owned(), json!(url));
                details.insert("timeout_ms".to_owned(), json!(millis(*timeout)));
            }
            Self::Http { url, body, .. } => {
                details.insert("url".to_owned(), json!(url));
                details.insert("response_body".to_owned(), json!(body));
            }
            Self::Transport { url, .. } => {
                details.insert("url".to_owned(), json!(url));
            }
            Self::Configuration(_) => {}
        }
        details
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

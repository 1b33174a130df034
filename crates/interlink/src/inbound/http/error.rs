//! HTTP mapping for service client failures.
//!
//! Purpose: let Actix handlers return [`ServiceError`] directly (`?` on a
//! client call) and still answer with a consistent JSON envelope and status
//! code. Configuration failures are deployment defects and are redacted.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::domain::error::{ServiceError, ValidationStage};
use crate::domain::trace::{TRACE_ID_HEADER, current_trace_id};

/// Convenient result alias for handlers that call other services.
pub type ApiResult<T> = Result<T, ServiceError>;

/// JSON envelope written for a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Stable machine-readable category.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Trace identifier of the failed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Structured diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    fn from_error(err: &ServiceError) -> Self {
        let trace_id = current_trace_id().map(|id| id.to_string());
        if let ServiceError::Configuration(_) = err {
            return Self {
                code: "internal_error".to_owned(),
                message: "Internal server error".to_owned(),
                trace_id,
                details: None,
            };
        }
        let details = err.details();
        Self {
            code: err.error_type().to_owned(),
            message: err.to_string(),
            trace_id,
            details: (!details.is_empty()).then_some(Value::Object(details)),
        }
    }
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Validation {
            stage: ValidationStage::Request,
            ..
        } => StatusCode::BAD_REQUEST,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Validation {
            stage: ValidationStage::Response,
            ..
        }
        | ServiceError::Http { .. }
        | ServiceError::Transport { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        status_for(self)
    }

    fn error_response(&self) -> HttpResponse {
        if let Self::Configuration(source) = self {
            error!(error = %source, "service call misconfigured");
        }
        let body = ErrorBody::from_error(self);
        let mut builder = HttpResponse::build(ResponseError::status_code(self));
        if let Some(id) = &body.trace_id {
            builder.insert_header((TRACE_ID_HEADER, id.clone()));
        }
        builder.json(body)
    }
}

//! Actix Web integration: trace propagation middleware and error responses.

pub mod error;
pub mod observability;

pub use error::{ApiResult, ErrorBody};
pub use observability::Observability;

//! Inter-service calls with hop-by-hop trace propagation.
//!
//! - [`domain`]: trace identifiers, endpoint and service registries, the
//!   service client and the structured event schema.
//! - [`inbound`]: Actix Web middleware that extends the trace per hop, plus
//!   error responses for handlers that call other services.
//! - [`outbound`]: reqwest transport and `tracing` event sink.
//! - [`settings`]: OrthoConfig settings and logging bootstrap.
//!
//! A service wraps its app in
//! [`Observability`](inbound::http::observability::Observability) and makes
//! downstream calls through a shared [`ServiceClient`](domain::ServiceClient);
//! the current trace identifier travels between the two without explicit
//! plumbing.

pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

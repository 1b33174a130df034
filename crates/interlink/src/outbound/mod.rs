//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **http**: reqwest-backed [`HttpTransport`](crate::domain::ports::HttpTransport)
//! - **logging**: `tracing`-backed [`EventSink`](crate::domain::ports::EventSink)
//!
//! Adapters are thin translators between domain types and library types. They
//! contain no call classification or correlation logic.

pub mod http;
pub mod logging;

pub use http::ReqwestTransport;
pub use logging::TracingEventSink;

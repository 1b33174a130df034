//! Domain ports for the hexagonal boundary.
//!
//! The service client depends only on these traits. Adapters live in
//! [`crate::outbound`]; doubles for tests live in `test_support`.

mod macros;
pub(crate) use macros::define_port_error;

mod event_sink;
mod http_transport;

#[cfg(test)]
pub use event_sink::MockEventSink;
pub use event_sink::{DiscardEventSink, EventSink};
#[cfg(test)]
pub use http_transport::MockHttpTransport;
pub use http_transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};

//! Domain types and services for inter-service calls.
//!
//! Purpose: keep the calling and correlation rules free of any particular web
//! framework or HTTP library. Adapters in [`crate::inbound`] and
//! [`crate::outbound`] plug into the [`ports`] defined here.
//!
//! Public surface:
//! - `TraceId`, `TraceContext` and the free trace functions: hop-by-hop
//!   identifiers and their call-chain scoped binding.
//! - `ServiceEndpoint`, `EndpointRegistry`, `ServiceRegistry`: where calls go.
//! - `ServiceClient`: how calls are made, classified and logged.
//! - `StructuredEvent`: the correlation log schema.
//! - `ServiceError`, `RegistryError`: what can go wrong.

pub mod client;
pub mod endpoint;
pub mod endpoint_registry;
pub mod error;
pub mod events;
pub mod ports;
pub mod service_registry;
pub mod trace;

pub use self::client::{
    DEFAULT_TIMEOUT, Params, Reply, RequestBody, ServiceClient, ServiceClientBuilder,
};
pub use self::endpoint::{EndpointValidationError, HttpMethod, Schema, ServiceEndpoint};
pub use self::endpoint_registry::EndpointRegistry;
pub use self::error::{RegistryError, ServiceError, ValidationStage};
pub use self::events::{Direction, EventKind, EventLevel, StructuredEvent, url_name_for_path};
pub use self::service_registry::{ServiceRegistry, ServiceRegistryBuilder};
pub use self::trace::{
    SERVICE_NAME_HEADER, TRACE_ID_HEADER, TraceContext, TraceId, TraceIdError, TraceSegment,
    UnscopedTraceError, append_segment, clear_trace_id, current_trace_id, generate_segment,
    increment_trace_id, set_trace_id,
};

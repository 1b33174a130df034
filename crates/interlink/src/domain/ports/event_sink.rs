//! Driven port for writing structured correlation events.

use crate::domain::events::StructuredEvent;

/// Destination for [`StructuredEvent`]s.
///
/// Emission is synchronous and infallible from the caller's perspective; a
/// sink that cannot write must drop the event rather than fail the call.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Write one event.
    fn emit(&self, event: &StructuredEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardEventSink;

impl EventSink for DiscardEventSink {
    fn emit(&self, _event: &StructuredEvent) {}
}

//! `tracing`-backed event sink.
//!
//! Each [`StructuredEvent`] becomes one `tracing` event under the
//! [`EVENT_TARGET`] target, at the event's own level, with every schema field
//! recorded as a structured field. Installing the JSON formatter from
//! [`crate::settings::init_logging`] yields one JSON object per event.

use tracing::{error, info, warn};

use crate::domain::events::{EventLevel, StructuredEvent};
use crate::domain::ports::EventSink;
use crate::domain::trace::TraceId;

/// `tracing` target carrying correlation events.
pub const EVENT_TARGET: &str = "interlink::events";

/// Sink that forwards events to the installed `tracing` subscriber.
///
/// # Examples
/// ```
/// use interlink::domain::events::StructuredEvent;
/// use interlink::domain::ports::EventSink;
/// use interlink::outbound::logging::TracingEventSink;
///
/// let event = StructuredEvent::server_request("web", "GET", "/api/users", "api.users");
/// TracingEventSink.emit(&event);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

macro_rules! record {
    ($macro:ident, $event:expr, $extra:expr) => {
        $macro!(
            target: EVENT_TARGET,
            name = $event.name(),
            direction = $event.direction().as_str(),
            peer_service = $event.peer_service(),
            method = $event.method(),
            url = $event.url(),
            path = $event.path(),
            url_name = $event.url_name(),
            status_code = $event.status_code(),
            duration_ms = $event.duration_ms(),
            error = $event.error(),
            error_type = $event.error_type(),
            trace_id = $event.trace_id().map(TraceId::as_str),
            extra = $extra,
            "{}",
            $event.name()
        )
    };
}

impl EventSink for TracingEventSink {
    fn emit(&self, event: &StructuredEvent) {
        let extra = (!event.extra().is_empty())
            .then(|| serde_json::to_string(event.extra()).ok())
            .flatten();
        let extra_field = extra.as_deref();
        match event.level() {
            EventLevel::Info => record!(info, event, extra_field),
            EventLevel::Warn => record!(warn, event, extra_field),
            EventLevel::Error => record!(error, event, extra_field),
        }
    }
}

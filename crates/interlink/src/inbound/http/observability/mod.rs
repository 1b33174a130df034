//! Observability middleware extending the trace identifier per hop.
//!
//! Every request gets this service's segment appended to the incoming
//! `X-Trace-ID` (or starts a new trace), runs with that identifier bound to
//! its call chain, and is bracketed by `http.server.request` and
//! `http.server.response` events. Failures add an `http.server.error` event.
//! The extended identifier is written back on the response.
//!
//! The identifier is bound with [`TraceContext::scope`], so service client
//! calls made by the handler forward it without any explicit plumbing.
//! Tokio task-local variables are not inherited across spawned tasks; use
//! [`TraceContext::spawn`] for background work.
//!
//! Each request also runs inside a `request` span recording `trace_id`, so
//! every `tracing` record emitted while handling it can be joined on the
//! identifier. [`Observability::with_parent_span`] nests those spans under a
//! process span such as
//! [`InterlinkSettings::service_span`](crate::settings::InterlinkSettings::service_span).

use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{Instrument, Span, error, info_span};

use crate::domain::error::ServiceError;
use crate::domain::events::{StructuredEvent, url_name_for_path};
use crate::domain::ports::EventSink;
use crate::domain::trace::{
    SERVICE_NAME_HEADER, TRACE_ID_HEADER, TraceContext, TraceId, increment_trace_id,
};

/// Peer label used when the caller does not announce itself.
pub const UNKNOWN_PEER: &str = "unknown";

/// Error category for failures that are not [`ServiceError`]s.
const HANDLER_ERROR: &str = "handler_error";

/// Observability middleware.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use actix_web::App;
/// use interlink::inbound::http::observability::Observability;
/// use interlink::outbound::logging::TracingEventSink;
///
/// let app = App::new().wrap(Observability::new(Arc::new(TracingEventSink)));
/// ```
#[derive(Clone)]
pub struct Observability {
    sink: Arc<dyn EventSink>,
    service_name: Option<Arc<str>>,
    parent_span: Option<Span>,
}

impl Observability {
    /// Middleware writing events to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            service_name: None,
            parent_span: None,
        }
    }

    /// Record this service's own name on every server event.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(Arc::from(name.into()));
        self
    }

    /// Open each request span as a child of `span`, so records emitted while
    /// handling a request also carry the parent's fields.
    #[must_use]
    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.parent_span = Some(span);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for Observability
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ObservabilityMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ObservabilityMiddleware {
            service: Rc::new(service),
            sink: Arc::clone(&self.sink),
            service_name: self.service_name.clone(),
            parent_span: self.parent_span.clone(),
        }))
    }
}

/// Service wrapper produced by [`Observability`].
///
/// Applications should not use this type directly.
pub struct ObservabilityMiddleware<S> {
    service: Rc<S>,
    sink: Arc<dyn EventSink>,
    service_name: Option<Arc<str>>,
    parent_span: Option<Span>,
}

/// Request facts captured before the handler consumes the request.
struct Exchange {
    peer: String,
    method: String,
    path: String,
    url_name: String,
    service_name: Option<Arc<str>>,
}

impl Exchange {
    fn read(req: &ServiceRequest, service_name: Option<Arc<str>>) -> Self {
        let path = req.path().to_owned();
        Self {
            peer: req
                .headers()
                .get(SERVICE_NAME_HEADER)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(UNKNOWN_PEER)
                .to_owned(),
            method: req.method().as_str().to_owned(),
            url_name: url_name_for_path(&path),
            path,
            service_name,
        }
    }

    fn tag(&self, event: StructuredEvent) -> StructuredEvent {
        match &self.service_name {
            Some(name) => event.with_field("service", name.as_ref()),
            None => event,
        }
    }

    fn request_event(&self) -> StructuredEvent {
        self.tag(StructuredEvent::server_request(
            &self.peer,
            &self.method,
            &self.path,
            &self.url_name,
        ))
    }

    fn response_event(&self, status: u16, started: Instant) -> StructuredEvent {
        self.tag(StructuredEvent::server_response(
            &self.peer,
            &self.method,
            &self.path,
            &self.url_name,
            status,
            started.elapsed(),
        ))
    }

    fn error_event(&self, err: &Error) -> StructuredEvent {
        let error_type = err
            .as_error::<ServiceError>()
            .map_or(HANDLER_ERROR, ServiceError::error_type);
        self.tag(StructuredEvent::server_error(
            &self.peer,
            &self.method,
            &self.path,
            &self.url_name,
            err.to_string(),
            error_type,
        ))
    }
}

fn incoming_trace_id(req: &ServiceRequest) -> Option<TraceId> {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.parse().ok())
}

fn attach_trace_header<B>(res: &mut ServiceResponse<B>, trace_id: &TraceId) {
    match HeaderValue::from_str(trace_id.as_str()) {
        Ok(value) => {
            res.response_mut()
                .headers_mut()
                .insert(HeaderName::from_static("x-trace-id"), value);
        }
        Err(err) => {
            error!(
                error = %err,
                trace_id = %trace_id,
                "failed to encode trace identifier header"
            );
        }
    }
}

impl<S, B> Service<ServiceRequest> for ObservabilityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let incoming = incoming_trace_id(&req);
        let trace_id = increment_trace_id(incoming.as_ref(), None);
        let exchange = Exchange::read(&req, self.service_name.clone());
        let service = Rc::clone(&self.service);
        let sink = Arc::clone(&self.sink);
        let span = info_span!(
            parent: self.parent_span.as_ref().and_then(Span::id),
            "request",
            trace_id = %trace_id,
            method = %exchange.method,
            path = %exchange.path
        );

        let scoped = TraceContext::scope(Some(trace_id.clone()), async move {
            let started = Instant::now();
            sink.emit(&exchange.request_event());

            match service.call(req).await {
                Ok(mut res) => {
                    if let Some(err) = res.response().error() {
                        sink.emit(&exchange.error_event(err));
                    }
                    sink.emit(&exchange.response_event(res.status().as_u16(), started));
                    attach_trace_header(&mut res, &trace_id);
                    Ok(res)
                }
                Err(err) => {
                    sink.emit(&exchange.error_event(&err));
                    sink.emit(&exchange.response_event(500, started));
                    Err(err)
                }
            }
        });
        Box::pin(scoped.instrument(span))
    }
}

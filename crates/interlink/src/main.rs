//! Demo service: a small gateway that forwards to `census` and `hermes`.
//!
//! Downstream addresses come from `CENSUS_BASE_URL` and `HERMES_BASE_URL`.
//! Every request is wrapped by the observability middleware, so calls made by
//! the handlers forward the extended `X-Trace-ID` automatically.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, web};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info};

use interlink::domain::ports::EventSink;
use interlink::domain::{
    EndpointRegistry, HttpMethod, Schema, ServiceClient, ServiceEndpoint, ServiceRegistry,
};
use interlink::inbound::http::{ApiResult, Observability};
use interlink::outbound::{ReqwestTransport, TracingEventSink};
use interlink::settings::{InterlinkSettings, init_logging};

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Customer record served by `census`.
#[derive(Debug, Serialize, Deserialize)]
struct Customer {
    id: String,
    name: String,
}

/// Notification accepted by `hermes`.
#[derive(Debug, Serialize, Deserialize)]
struct Notification {
    recipient: String,
    message: String,
}

fn startup_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

fn register_endpoints(registry: &EndpointRegistry) -> std::io::Result<()> {
    registry
        .bulk_register([
            (
                "census.customer.get",
                ServiceEndpoint::new("census", "/api/customers/{id}", HttpMethod::Get)
                    .map_err(startup_error)?
                    .with_response_schema(Schema::of::<Customer>()),
            ),
            (
                "hermes.notify",
                ServiceEndpoint::new("hermes", "/api/notifications", HttpMethod::Post)
                    .map_err(startup_error)?
                    .with_request_schema(Schema::for_request::<Notification>()),
            ),
        ])
        .map_err(startup_error)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().finish()
}

async fn customer(
    client: web::Data<ServiceClient>,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let reply = client
        .get("census.customer.get", &[("id", id.as_str())], &[])
        .await?;
    let found: Customer = reply.into_model()?;
    Ok(HttpResponse::Ok().json(found))
}

async fn notify(
    client: web::Data<ServiceClient>,
    body: web::Json<Notification>,
) -> ApiResult<HttpResponse> {
    let reply = client
        .post("hermes.notify", &body.into_inner(), &[], &[])
        .await?;
    Ok(match reply.into_json() {
        Some(document) => HttpResponse::Accepted().json(document),
        None => HttpResponse::Accepted().finish(),
    })
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = InterlinkSettings::load().map_err(startup_error)?;
    init_logging(&settings);
    let service_span = settings.service_span();

    let endpoints = EndpointRegistry::global();
    register_endpoints(&endpoints)?;
    let services = ServiceRegistry::from_vars(std::env::vars()).map_err(startup_error)?;
    let transport = ReqwestTransport::new(CONNECT_TIMEOUT).map_err(startup_error)?;
    let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);

    let mut builder = ServiceClient::builder(endpoints, Arc::new(services), Arc::new(transport))
        .sink(Arc::clone(&sink))
        .default_timeout(settings.http_timeout());
    if let Some(name) = settings.service_name() {
        builder = builder.service_name(name);
    }
    let client = web::Data::new(builder.build());

    let mut observability = Observability::new(sink).with_parent_span(service_span.clone());
    if let Some(name) = settings.service_name() {
        observability = observability.with_service_name(name);
    }

    service_span.in_scope(|| info!("starting demo service"));

    HttpServer::new(move || {
        App::new()
            .app_data(client.clone())
            .wrap(observability.clone())
            .route("/health", web::get().to(health))
            .route("/api/customers/{id}", web::get().to(customer))
            .route("/api/notifications", web::post().to(notify))
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .instrument(service_span)
    .await
}

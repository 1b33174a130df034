//! End-to-end trace propagation across two services over real sockets.
//!
//! A `gateway` service calls a `census` service through the reqwest transport.
//! Both are wrapped by the observability middleware, so each hop appends one
//! segment and the caller's identifier reaches the callee verbatim.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use interlink::domain::ports::{EventSink, HttpTransport};
use interlink::domain::{
    EndpointRegistry, HttpMethod, Schema, ServiceClient, ServiceEndpoint, ServiceRegistry,
    TRACE_ID_HEADER, current_trace_id,
};
use interlink::inbound::http::{ApiResult, ErrorBody, Observability};
use interlink::outbound::ReqwestTransport;
use interlink::test_support::RecordingEventSink;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Customer {
    id: String,
    name: String,
}

/// `(incoming X-Trace-ID, identifier bound while handling)` per census call.
type Sightings = Arc<Mutex<Vec<(Option<String>, Option<String>)>>>;

struct Service {
    base_url: String,
    handle: ServerHandle,
    sink: Arc<RecordingEventSink>,
}

fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local address");
    (listener, format!("http://{addr}"))
}

async fn census_customer(
    req: HttpRequest,
    id: web::Path<String>,
    sightings: web::Data<Sightings>,
) -> HttpResponse {
    let incoming = req
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let bound = current_trace_id().map(|trace| trace.to_string());
    sightings.lock().expect("sightings lock").push((incoming, bound));

    if id.as_str() == "missing" {
        return HttpResponse::NotFound().finish();
    }
    HttpResponse::Ok().json(Customer {
        id: id.into_inner(),
        name: "Ada".to_owned(),
    })
}

fn spawn_census(sightings: Sightings) -> Service {
    let (listener, base_url) = bind();
    let sink = Arc::new(RecordingEventSink::new());
    let middleware = Observability::new(Arc::clone(&sink) as Arc<dyn EventSink>)
        .with_service_name("census");
    let data = web::Data::new(sightings);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(middleware.clone())
            .route("/api/customers/{id}", web::get().to(census_customer))
    })
    .disable_signals()
    .workers(1)
    .listen(listener)
    .expect("listen")
    .run();
    let handle = server.handle();
    actix_rt::spawn(server);
    Service {
        base_url,
        handle,
        sink,
    }
}

async fn gateway_customer(
    client: web::Data<ServiceClient>,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let customer: Customer = client
        .get("census.customer.get", &[("id", id.as_str())], &[])
        .await?
        .into_model()?;
    Ok(HttpResponse::Ok().json(customer))
}

fn spawn_gateway(census_url: &str) -> Service {
    let (listener, base_url) = bind();
    let sink = Arc::new(RecordingEventSink::new());

    let endpoints = EndpointRegistry::new();
    endpoints
        .register(
            "census.customer.get",
            ServiceEndpoint::new("census", "/api/customers/{id}", HttpMethod::Get)
                .expect("valid endpoint")
                .with_response_schema(Schema::of::<Customer>()),
        )
        .expect("register endpoint");
    let services = ServiceRegistry::from_vars([("CENSUS_BASE_URL", census_url)])
        .expect("valid census address");
    let transport = ReqwestTransport::new(Duration::from_secs(2)).expect("client builds");
    let client = web::Data::new(
        ServiceClient::builder(
            Arc::new(endpoints),
            Arc::new(services),
            Arc::new(transport) as Arc<dyn HttpTransport>,
        )
        .sink(Arc::clone(&sink) as Arc<dyn EventSink>)
        .service_name("gateway")
        .default_timeout(Duration::from_secs(5))
        .build(),
    );
    let middleware = Observability::new(Arc::clone(&sink) as Arc<dyn EventSink>)
        .with_service_name("gateway");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(client.clone())
            .wrap(middleware.clone())
            .route("/customers/{id}", web::get().to(gateway_customer))
    })
    .disable_signals()
    .workers(1)
    .listen(listener)
    .expect("listen")
    .run();
    let handle = server.handle();
    actix_rt::spawn(server);
    Service {
        base_url,
        handle,
        sink,
    }
}

fn is_segment(raw: &str) -> bool {
    raw.len() == 5
        && raw
            .bytes()
            .all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit())
}

fn trace_header(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .expect("trace header present")
}

async fn stop(services: [&Service; 2]) {
    for service in services {
        service.handle.stop(true).await;
    }
}

#[actix_rt::test]
async fn each_hop_appends_one_segment() {
    let sightings = Sightings::default();
    let census = spawn_census(Arc::clone(&sightings));
    let gateway = spawn_gateway(&census.base_url);

    let response = reqwest::Client::new()
        .get(format!("{}/customers/7", gateway.base_url))
        .header(TRACE_ID_HEADER, "UICALL")
        .header("X-Service-Name", "web")
        .send()
        .await
        .expect("gateway reachable");
    let gateway_trace = trace_header(&response);
    assert_eq!(response.status().as_u16(), 200);
    let customer: Customer = response.json().await.expect("customer JSON");
    assert_eq!(customer.id, "7");

    let (prefix, own) = gateway_trace.split_once('.').expect("two segments");
    assert_eq!(prefix, "UICALL");
    assert!(is_segment(own), "{gateway_trace}");

    let seen = sightings.lock().expect("sightings lock").clone();
    let [(incoming, bound)] = seen.as_slice() else {
        panic!("census should be called once: {seen:?}");
    };
    assert_eq!(incoming.as_deref(), Some(gateway_trace.as_str()));
    let census_trace = bound.clone().expect("census binds a trace");
    let census_own = census_trace
        .strip_prefix(&format!("{gateway_trace}."))
        .expect("census extends the gateway trace");
    assert!(is_segment(census_own), "{census_trace}");

    stop([&gateway, &census]).await;
}

#[actix_rt::test]
async fn events_on_both_sides_share_the_chain() {
    let sightings = Sightings::default();
    let census = spawn_census(Arc::clone(&sightings));
    let gateway = spawn_gateway(&census.base_url);

    let response = reqwest::Client::new()
        .get(format!("{}/customers/7", gateway.base_url))
        .send()
        .await
        .expect("gateway reachable");
    let gateway_trace = trace_header(&response);
    assert!(is_segment(&gateway_trace), "origin starts a one-segment trace");
    let seen = sightings.lock().expect("sightings lock").clone();
    let forwarded: Vec<Option<String>> = seen.into_iter().map(|(incoming, _)| incoming).collect();
    assert_eq!(forwarded, [Some(gateway_trace.clone())]);

    assert_eq!(
        gateway.sink.names(),
        [
            "http.server.request",
            "http.client.request",
            "http.client.response",
            "http.server.response"
        ]
    );
    for event in gateway.sink.events() {
        assert_eq!(
            event.trace_id().map(|trace| trace.as_str().to_owned()),
            Some(gateway_trace.clone()),
            "{}",
            event.name()
        );
    }
    let outbound = gateway
        .sink
        .find("http.client.request")
        .expect("client request event");
    assert_eq!(outbound.peer_service(), "census");
    assert_eq!(outbound.url_name(), "census.customer.get");

    let inbound = census
        .sink
        .find("http.server.request")
        .expect("census request event");
    assert_eq!(inbound.peer_service(), "gateway");
    assert_eq!(inbound.url_name(), "api.customers.7");

    stop([&gateway, &census]).await;
}

#[actix_rt::test]
async fn downstream_not_found_surfaces_as_json_error() {
    let sightings = Sightings::default();
    let census = spawn_census(Arc::clone(&sightings));
    let gateway = spawn_gateway(&census.base_url);

    let response = reqwest::Client::new()
        .get(format!("{}/customers/missing", gateway.base_url))
        .header(TRACE_ID_HEADER, "UICALL")
        .send()
        .await
        .expect("gateway reachable");
    let gateway_trace = trace_header(&response);
    assert_eq!(response.status().as_u16(), 404);
    let body: ErrorBody = response.json().await.expect("error JSON");

    assert_eq!(body.code, "not_found");
    assert_eq!(body.trace_id.as_deref(), Some(gateway_trace.as_str()));
    assert!(gateway_trace.starts_with("UICALL."), "{gateway_trace}");
    assert_eq!(
        gateway.sink.names(),
        [
            "http.server.request",
            "http.client.request",
            "http.client.error",
            "http.server.error",
            "http.server.response"
        ]
    );

    stop([&gateway, &census]).await;
}

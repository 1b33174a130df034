//! Reqwest-backed transport adapter.
//!
//! This adapter owns transport details only: method and header translation,
//! the per-request timeout and error mapping. Status classification, trace
//! headers and logging stay in the service client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};

use crate::domain::endpoint::HttpMethod;
use crate::domain::ports::{HttpTransport, TransportError, TransportRequest, TransportResponse};

/// Transport that performs requests with a shared [`reqwest::Client`].
///
/// The client keeps a connection pool, so one transport should be shared by
/// every service client in a process.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport whose connections time out after `connect_timeout`.
    ///
    /// Whole-exchange timeouts come from each [`TransportRequest`].
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self::with_client(client))
    }

    /// Wrap an already configured client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn method_for(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

fn map_transport_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else if error.is_builder() {
        TransportError::invalid_request(error.to_string())
    } else {
        TransportError::connection(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            query,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self
            .client
            .request(method_for(method), url.as_str())
            .timeout(timeout);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(document) = &body {
            builder = builder.json(document);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| map_transport_error(&error))?;
        let status = response.status().as_u16();
        let response_headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|text| (name.as_str().to_owned(), text.to_owned()))
            })
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(&error))?;

        Ok(TransportResponse {
            status,
            headers: response_headers,
            body: bytes.to_vec(),
        })
    }
}

//! The fetch primitive the pipeline drives.
//!
//! A `Transport` performs exactly one round-trip and reports either the
//! response (whatever its status) or a transport-level failure. Status
//! interpretation, retries and timeouts all live in the pipeline.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request`. A returned non-2xx response is `Ok`; only failures
    /// where no response was received are `Err`.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use crate::http::HttpMethod;

    /// Production transport backed by `reqwest`.
    ///
    /// Redirects are followed by reqwest itself. The pipeline's per-attempt
    /// cancellation token is raced against the round-trip so an aborted
    /// attempt releases its connection promptly.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let method = match request.method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Head => reqwest::Method::HEAD,
                HttpMethod::Post => reqwest::Method::POST,
                HttpMethod::Put => reqwest::Method::PUT,
                HttpMethod::Patch => reqwest::Method::PATCH,
                HttpMethod::Delete => reqwest::Method::DELETE,
            };

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.text().await.map_err(map_reqwest_error)?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }

    fn map_reqwest_error(e: reqwest::Error) -> TransportError {
        if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let signal = request.signal.clone();
            tokio::select! {
                biased;
                _ = signal.cancelled() => Err(TransportError::Cancelled),
                result = self.round_trip(request) => result,
            }
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestTransport;

//! The request pipeline: interceptors, CSRF injection, timeout and retries
//! around a single `Transport`.
//!
//! # Design
//! `RequestPipeline` is cheap to clone; clones share the transport, the
//! config and the interceptor registry. A call moves through three phases:
//!
//! 1. build: request interceptors, then CSRF injection for mutating methods,
//!    then option defaults are resolved against `PipelineConfig`;
//! 2. attempt loop: each attempt gets a fresh cancellation token and the
//!    full timeout; failures are classified and either retried or returned;
//! 3. settle: response interceptors on success, error interceptors on the
//!    final failure. Error interceptors run once per call, never per attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::csrf::{inject_csrf, CsrfSource};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestDescriptor, RequestOptions};
use crate::interceptor::{ErrorInterceptor, Interceptors, RequestInterceptor, ResponseInterceptor};
use crate::rate_limit::RateLimiter;
use crate::retry::{Backoff, RetryState};
use crate::transport::Transport;

#[derive(Clone)]
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    csrf: Option<Arc<dyn CsrfSource>>,
    config: Arc<PipelineConfig>,
    interceptors: Arc<Interceptors>,
}

pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    csrf: Option<Arc<dyn CsrfSource>>,
    config: PipelineConfig,
    interceptors: Option<Arc<Interceptors>>,
    rate_limiter: Option<Box<dyn RateLimiter>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Without a CSRF source no token header is added.
    pub fn csrf_source(mut self, source: impl CsrfSource + 'static) -> Self {
        self.csrf = Some(Arc::new(source));
        self
    }

    pub fn rate_limiter(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.rate_limiter = Some(Box::new(limiter));
        self
    }

    /// Share an existing registry instead of starting with an empty one.
    pub fn interceptors(mut self, interceptors: Arc<Interceptors>) -> Self {
        self.interceptors = Some(interceptors);
        self
    }

    pub fn build(self) -> RequestPipeline {
        let transport = match &self.rate_limiter {
            Some(limiter) => limiter.wrap(self.transport),
            None => self.transport,
        };
        RequestPipeline {
            transport,
            csrf: self.csrf,
            config: Arc::new(self.config),
            interceptors: self.interceptors.unwrap_or_default(),
        }
    }
}

/// Options with every default applied, fixed for the whole attempt loop.
struct ResolvedOptions {
    method: HttpMethod,
    headers: Vec<(String, String)>,
    body: Option<String>,
    timeout: Duration,
    retries: u32,
    check_status: bool,
    backoff: Backoff,
}

impl RequestPipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder {
            transport,
            csrf: None,
            config: PipelineConfig::default(),
            interceptors: None,
            rate_limiter: None,
        }
    }

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn interceptors(&self) -> &Arc<Interceptors> {
        &self.interceptors
    }

    pub fn add_request_interceptor(&self, interceptor: impl RequestInterceptor + 'static) {
        self.interceptors.add_request(interceptor);
    }

    pub fn add_response_interceptor(&self, interceptor: impl ResponseInterceptor + 'static) {
        self.interceptors.add_response(interceptor);
    }

    pub fn add_error_interceptor(&self, interceptor: impl ErrorInterceptor + 'static) {
        self.interceptors.add_error(interceptor);
    }

    pub fn clear_interceptors(&self) {
        self.interceptors.clear();
    }

    /// Run `url` through the pipeline.
    ///
    /// Returns the (response-intercepted) response of the first accepted
    /// attempt, or the classified error of the last attempt after error
    /// interceptors have seen it.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!("fetch", %request_id, method = %options.method, url);

        async move {
            match self.execute(url, options).await {
                Ok(response) => Ok(self.interceptors.apply_response(response).await),
                Err(error) => Err(self.interceptors.apply_error(error).await),
            }
        }
        .instrument(span)
        .await
    }

    /// `fetch_with_retry` with default options.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, ApiError> {
        self.fetch_with_retry(url, RequestOptions::default()).await
    }

    async fn execute(&self, url: &str, options: RequestOptions) -> Result<HttpResponse, ApiError> {
        let RequestDescriptor { url, options } = self
            .interceptors
            .apply_request(RequestDescriptor::new(url, options))
            .await?;

        let options = match &self.csrf {
            Some(source) => inject_csrf(options, &self.config.csrf_header, source.as_ref()).await,
            None => options,
        };
        let options = self.resolve(options);

        let mut state = RetryState::new(options.retries);
        loop {
            debug!(
                %url,
                attempt = state.attempt + 1,
                max_attempts = state.max_attempts,
                "sending request"
            );

            let error = match self.attempt(&url, &options).await {
                Ok(response) => {
                    debug!(status = response.status, "request settled");
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(%error, "terminal failure");
                return Err(error);
            }
            if !state.has_remaining() {
                debug!(%error, attempts = state.max_attempts, "retries exhausted");
                return Err(error);
            }

            let delay = options.backoff.delay(state.attempt);
            warn!(%error, attempt = state.attempt + 1, ?delay, "retrying request");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            state.advance();
        }
    }

    async fn attempt(&self, url: &str, options: &ResolvedOptions) -> Result<HttpResponse, ApiError> {
        let signal = CancellationToken::new();
        let request = HttpRequest {
            method: options.method,
            url: url.to_string(),
            headers: options.headers.clone(),
            body: options.body.clone(),
            signal: signal.clone(),
        };

        let response = match tokio::time::timeout(options.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => {
                signal.cancel();
                return Err(ApiError::Timeout {
                    timeout_ms: u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        if options.check_status && response.status >= 400 {
            return Err(ApiError::from_status(response.status, response.body));
        }
        Ok(response)
    }

    fn resolve(&self, options: RequestOptions) -> ResolvedOptions {
        ResolvedOptions {
            method: options.method,
            headers: options.headers,
            body: options.body,
            timeout: options.timeout.unwrap_or_else(|| self.config.timeout()),
            retries: options.retries.unwrap_or(self.config.retries),
            check_status: options.check_status,
            backoff: options.backoff.unwrap_or(self.config.backoff),
        }
    }
}

//! Resilient HTTP request pipeline for the firm's site and admin panel.
//!
//! # Overview
//! `RequestPipeline::fetch_with_retry` wraps a `Transport` with an ordered
//! interceptor chain, CSRF injection for mutating verbs, a per-attempt
//! timeout that cancels the in-flight call, and a bounded retry loop that
//! classifies every failure into an `ApiError`.
//!
//! # Design
//! - The interceptor registry belongs to the pipeline (shared by its clones),
//!   not to the process; a fresh pipeline is a fresh registry.
//! - `ApiError` is a closed enum so callers branch with `match`.
//! - Options are resolved against `PipelineConfig` once per call; retries
//!   reuse the resolved values.
//! - Transport, CSRF source and rate limiter are traits so tests and hosts
//!   can plug in their own; `ReqwestTransport` is the default production
//!   transport.
//!
//! ```no_run
//! # async fn run() -> Result<(), request_pipeline::ApiError> {
//! use std::sync::Arc;
//! use request_pipeline::{RequestOptions, RequestPipeline, ReqwestTransport, StaticCsrfToken};
//!
//! let pipeline = RequestPipeline::builder(Arc::new(ReqwestTransport::new()))
//!     .csrf_source(StaticCsrfToken("token-from-session".into()))
//!     .build();
//! let blogs = pipeline
//!     .fetch_with_retry("http://localhost:3000/api/blogs", RequestOptions::default().with_retries(2))
//!     .await?;
//! println!("{}", blogs.body);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod csrf;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use client::{PipelineBuilder, RequestPipeline};
pub use config::PipelineConfig;
pub use csrf::{CsrfSource, StaticCsrfToken, DEFAULT_CSRF_HEADER};
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestDescriptor, RequestOptions};
pub use interceptor::{ErrorInterceptor, Interceptors, RequestInterceptor, ResponseInterceptor};
pub use rate_limit::{RateLimiter, TokenBucket, TokenBucketLimiter, Unlimited};
pub use retry::{Backoff, RetryState};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use transport::Transport;

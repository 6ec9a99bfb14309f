//! Error types for the request pipeline.
//!
//! # Design
//! `ApiError` is the closed set of failures `fetch_with_retry` can surface.
//! Callers match on it instead of probing error types at runtime, e.g. an
//! `Authentication` failure sends the user back to the login page. The
//! status-specific variants exist because callers branch on them; every other
//! non-success status lands in `Http` with the raw status and body.
//!
//! `Serialization` / `Deserialization` are only produced by the JSON helpers
//! on `RequestOptions` and `HttpResponse`, never by the pipeline itself.

use thiserror::Error;

/// Errors returned by `RequestPipeline::fetch_with_retry`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The transport failed before any response arrived (DNS, refused
    /// connection, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The attempt did not settle within the configured timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The server returned 401.
    #[error("Authentication required")]
    Authentication,

    /// The server returned 403.
    #[error("Access denied")]
    Authorization,

    /// The server returned 404.
    #[error("Resource not found")]
    NotFound,

    /// Any other status the pipeline does not accept.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// An error interceptor replaced the classified error with its own.
    #[error("{message}")]
    Intercepted {
        message: String,
        #[source]
        source: Box<ApiError>,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// Map a status the pipeline refuses to accept onto its error kind.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => ApiError::Authentication,
            403 => ApiError::Authorization,
            404 => ApiError::NotFound,
            _ => ApiError::Http { status, body },
        }
    }

    /// Wrap this error under a new message, keeping it as the source.
    pub fn intercepted(self, message: impl Into<String>) -> Self {
        ApiError::Intercepted {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Transport failures, timeouts and 5xx are transient; every 4xx is
    /// assumed to fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout { .. } => true,
            ApiError::Http { status, .. } => *status >= 500,
            ApiError::Intercepted { source, .. } => source.is_retryable(),
            ApiError::Authentication
            | ApiError::Authorization
            | ApiError::NotFound
            | ApiError::Serialization(_)
            | ApiError::Deserialization(_) => false,
        }
    }

    /// The HTTP status behind this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication => Some(401),
            ApiError::Authorization => Some(403),
            ApiError::NotFound => Some(404),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Intercepted { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Failures reported by a `Transport` implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        ApiError::Network(e.to_string())
    }
}

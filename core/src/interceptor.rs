//! Request, response and error interceptors.
//!
//! # Design
//! `Interceptors` keeps three append-only, ordered sequences behind locks so
//! one registry can be shared by every clone of a pipeline across threads.
//! Each pipeline stage takes a snapshot of its sequence when the stage
//! begins: an interceptor registered while a call is in flight still applies
//! to that call's later stages. Locks are never held across an `.await`.
//!
//! Plain closures implement the traits, so most callers never name them:
//!
//! ```
//! use request_pipeline::{HttpResponse, Interceptors};
//!
//! let interceptors = Interceptors::default();
//! interceptors.add_response(|response: HttpResponse| response.with_header("x-seen", "1"));
//! assert_eq!(interceptors.len(), (0, 1, 0));
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::http::{HttpResponse, RequestDescriptor};

/// Rewrites the request before CSRF injection and the first attempt.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor, ApiError>;
}

/// Transforms a successful response before it reaches the caller.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(&self, response: HttpResponse) -> HttpResponse;
}

/// Observes the final failure of a call and returns the error the next
/// interceptor (or the caller) sees. Returning the input is a passthrough.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn on_error(&self, error: ApiError) -> ApiError;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(RequestDescriptor) -> RequestDescriptor + Send + Sync,
{
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor, ApiError> {
        Ok(self(request))
    }
}

#[async_trait]
impl<F> ResponseInterceptor for F
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    async fn on_response(&self, response: HttpResponse) -> HttpResponse {
        self(response)
    }
}

#[async_trait]
impl<F> ErrorInterceptor for F
where
    F: Fn(ApiError) -> ApiError + Send + Sync,
{
    async fn on_error(&self, error: ApiError) -> ApiError {
        self(error)
    }
}

#[derive(Default)]
pub struct Interceptors {
    request: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
    error: RwLock<Vec<Arc<dyn ErrorInterceptor>>>,
}

impl Interceptors {
    pub fn add_request(&self, interceptor: impl RequestInterceptor + 'static) {
        write(&self.request).push(Arc::new(interceptor));
    }

    pub fn add_response(&self, interceptor: impl ResponseInterceptor + 'static) {
        write(&self.response).push(Arc::new(interceptor));
    }

    pub fn add_error(&self, interceptor: impl ErrorInterceptor + 'static) {
        write(&self.error).push(Arc::new(interceptor));
    }

    /// Drop every registered interceptor. Calls already past a stage keep
    /// the snapshot they took.
    pub fn clear(&self) {
        write(&self.request).clear();
        write(&self.response).clear();
        write(&self.error).clear();
    }

    /// Number of (request, response, error) interceptors.
    pub fn len(&self) -> (usize, usize, usize) {
        (
            read(&self.request).len(),
            read(&self.response).len(),
            read(&self.error).len(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0, 0)
    }

    pub(crate) async fn apply_request(
        &self,
        mut request: RequestDescriptor,
    ) -> Result<RequestDescriptor, ApiError> {
        let chain = read(&self.request).clone();
        for interceptor in chain {
            request = interceptor.on_request(request).await?;
        }
        Ok(request)
    }

    pub(crate) async fn apply_response(&self, mut response: HttpResponse) -> HttpResponse {
        let chain = read(&self.response).clone();
        for interceptor in chain {
            response = interceptor.on_response(response).await;
        }
        response
    }

    pub(crate) async fn apply_error(&self, mut error: ApiError) -> ApiError {
        let chain = read(&self.error).clone();
        for interceptor in chain {
            error = interceptor.on_error(error).await;
        }
        error
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (request, response, error) = self.len();
        f.debug_struct("Interceptors")
            .field("request", &request)
            .field("response", &response)
            .field("error", &error)
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

//! Rate limiting composed around the transport.
//!
//! A `RateLimiter` turns one transport into another. The pipeline wraps its
//! transport once at build time, so every attempt (retries included) passes
//! through the limiter.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

pub trait RateLimiter: Send + Sync {
    fn wrap(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport>;
}

/// Identity limiter: hands the transport back untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn wrap(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        transport
    }
}

/// Token bucket shared by every transport it wraps.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket holding `capacity` requests, regaining
    /// `refill_per_sec` of them every second.
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: f64::from(refill_per_sec.max(1)),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_none()
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.take_or_wait() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes a token and returns `None`, or returns how long until one is due.
    fn take_or_wait(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let missing = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Limits the request rate of every transport it wraps with one shared bucket.
#[derive(Debug, Clone)]
pub struct TokenBucketLimiter {
    bucket: Arc<TokenBucket>,
}

impl TokenBucketLimiter {
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            bucket: Arc::new(TokenBucket::new(capacity, refill_per_sec)),
        }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn wrap(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        Arc::new(Throttled {
            inner: transport,
            bucket: Arc::clone(&self.bucket),
        })
    }
}

struct Throttled {
    inner: Arc<dyn Transport>,
    bucket: Arc<TokenBucket>,
}

#[async_trait]
impl Transport for Throttled {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let signal = request.signal.clone();
        tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(TransportError::Cancelled),
            _ = self.bucket.acquire() => {}
        }
        self.inner.send(request).await
    }
}

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::http_client::{HttpClient, HttpFuture, HttpRequest};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-second smoothing in front of a transport.
///
/// Sits below the minute/day [`crate::RateLimiter`]: the limiter decides
/// whether a request may be spent at all, this only spaces admitted requests
/// so a worker pool does not fire them in one burst.
#[derive(Clone)]
pub struct BurstThrottle {
    limiter: Arc<DirectRateLimiter>,
    per_second: u32,
}

impl std::fmt::Debug for BurstThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurstThrottle")
            .field("per_second", &self.per_second)
            .finish()
    }
}

impl BurstThrottle {
    pub fn per_second(per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            per_second: rate.get(),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

/// Transport wrapper that waits on a [`BurstThrottle`] before each request.
pub struct ThrottledHttpClient {
    inner: Arc<dyn HttpClient>,
    throttle: BurstThrottle,
}

impl ThrottledHttpClient {
    pub fn new(inner: Arc<dyn HttpClient>, throttle: BurstThrottle) -> Self {
        Self { inner, throttle }
    }
}

impl HttpClient for ThrottledHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            self.throttle.acquire().await;
            self.inner.execute(request).await
        })
    }
}

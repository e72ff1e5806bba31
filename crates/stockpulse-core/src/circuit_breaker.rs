use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::ProviderId;

/// Breaker state for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Start of the single call admitted while half-open.
    trial_started_at: Option<Instant>,
}

/// Stops calls to a provider after repeated upstream failures.
///
/// Only provider-side faults (transport errors, 5xx, upstream 429) count.
/// Bad payloads for a single symbol do not.
///
/// Half-open admits one trial call at a time. A trial that never reports back
/// expires after `open_timeout` and the next caller tries instead.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: ProviderId,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            config,
            clock,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_started_at: None,
            }),
        }
    }

    pub fn allow_request(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock_inner();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                let free = inner.trial_started_at.is_none_or(|started| {
                    now.saturating_duration_since(started) >= self.config.open_timeout
                });
                if free {
                    inner.trial_started_at = Some(now);
                }
                free
            }
            CircuitState::Open => {
                let can_try = inner
                    .opened_at
                    .is_some_and(|opened_at| now.saturating_duration_since(opened_at) >= self.config.open_timeout);
                if can_try {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    inner.trial_started_at = Some(now);
                }
                can_try
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        if inner.state != CircuitState::Closed {
            info!(provider = %self.provider, "circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_started_at = None;
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock_inner();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trips = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trips && inner.state != CircuitState::Open {
            warn!(
                provider = %self.provider,
                failures = inner.consecutive_failures,
                "circuit opened"
            );
        }
        if trips {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
        }
        inner.trial_started_at = None;
    }

    /// Give up an admitted trial call without an outcome, e.g. when no limiter
    /// permit arrived in time.
    pub fn release_trial(&self) {
        let mut inner = self.lock_inner();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_started_at = None;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock_inner().state
    }

    fn lock_inner(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(threshold: u32) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::with_clock(
            ProviderId::Finnhub,
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_timeout: Duration::from_secs(10),
            },
            clock.clone(),
        );
        (breaker, clock)
    }

    #[test]
    fn opens_after_threshold_failures() {
        let (breaker, _clock) = breaker(2);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_trial_closes_on_success_and_reopens_on_failure() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure();

        clock.advance(Duration::from_secs(10));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(10));
        assert!(breaker.allow_request());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_one_trial_call_at_a_time() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure();
        clock.advance(Duration::from_secs(10));

        assert!(breaker.allow_request());
        for _ in 0..3 {
            assert!(!breaker.allow_request());
        }

        breaker.record_success();
        assert!(breaker.allow_request());
        assert!(breaker.allow_request());
    }

    #[test]
    fn released_or_stale_trial_lets_another_caller_in() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure();
        clock.advance(Duration::from_secs(10));

        assert!(breaker.allow_request());
        breaker.release_trial();
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());

        clock.advance(Duration::from_secs(10));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }
}

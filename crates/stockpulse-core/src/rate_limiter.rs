//! Per-provider token bucket with an optional rolling daily cap.
//!
//! The minute bucket refills continuously from elapsed time and starts full.
//! Fill is kept as integer credit (one token is one minute of nanoseconds)
//! and accrues `elapsed_ns * rpm`, so refill is exact however finely time is
//! observed.
//! The daily window opens at the first successful consumption and closes 24h
//! later; both are evaluated lazily on every call, there are no timers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::{ProviderId, ValidationError};

/// Credit worth one token.
const TOKEN: u128 = 60_000_000_000;
pub const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Quota for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_day: Option<u32>,
}

impl RateLimitConfig {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_day: None,
        }
    }

    pub fn with_daily_cap(mut self, requests_per_day: u32) -> Self {
        self.requests_per_day = Some(requests_per_day);
        self
    }

    fn capacity(self) -> u128 {
        u128::from(self.requests_per_minute) * TOKEN
    }

    fn validate(self) -> Result<Self, ValidationError> {
        if self.requests_per_minute == 0 {
            return Err(ValidationError::ZeroRequestsPerMinute);
        }
        if self.requests_per_day == Some(0) {
            return Err(ValidationError::ZeroRequestsPerDay);
        }
        Ok(self)
    }
}

/// Snapshot returned by [`RateLimiter::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimiterStatus {
    pub provider: ProviderId,
    pub tokens_remaining: u32,
    pub daily_remaining: Option<u32>,
}

#[derive(Debug)]
struct BucketState {
    credit: u128,
    last_refill_at: Instant,
    daily_count: u32,
    daily_reset_at: Option<Instant>,
    denying: bool,
}

#[derive(Debug)]
pub struct RateLimiter {
    provider: ProviderId,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(provider: ProviderId, config: RateLimitConfig) -> Result<Self, ValidationError> {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: ProviderId,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ValidationError> {
        let config = config.validate()?;
        let now = clock.now();

        Ok(Self {
            provider,
            config,
            clock,
            state: Mutex::new(BucketState {
                credit: config.capacity(),
                last_refill_at: now,
                daily_count: 0,
                daily_reset_at: None,
                denying: false,
            }),
        })
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Take one request permit. Exhaustion is reported only through `false`.
    pub fn consume_token(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refresh(&mut state, now);

        if self.daily_exhausted(&state) || state.credit < TOKEN {
            if !state.denying {
                state.denying = true;
                debug!(
                    provider = %self.provider,
                    tokens = whole_tokens(state.credit),
                    daily_count = state.daily_count,
                    "rate limiter started denying requests"
                );
            }
            return false;
        }

        state.credit -= TOKEN;
        state.daily_count = state.daily_count.saturating_add(1);
        if self.config.requests_per_day.is_some() && state.daily_reset_at.is_none() {
            state.daily_reset_at = Some(now + DAILY_WINDOW);
        }
        state.denying = false;
        true
    }

    /// Same checks as [`Self::consume_token`] without taking a permit.
    pub fn can_make_request(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refresh(&mut state, now);

        !self.daily_exhausted(&state) && state.credit >= TOKEN
    }

    pub fn status(&self) -> RateLimiterStatus {
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refresh(&mut state, now);

        RateLimiterStatus {
            provider: self.provider,
            tokens_remaining: whole_tokens(state.credit),
            daily_remaining: self
                .config
                .requests_per_day
                .map(|limit| limit.saturating_sub(state.daily_count)),
        }
    }

    /// Time until [`Self::consume_token`] could succeed, `None` if it could now.
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refresh(&mut state, now);

        if self.daily_exhausted(&state) {
            let wait = state
                .daily_reset_at
                .map(|reset_at| reset_at.saturating_duration_since(now))
                .unwrap_or(DAILY_WINDOW);
            return Some(wait.max(Duration::from_millis(1)));
        }

        if state.credit >= TOKEN {
            return None;
        }

        let missing = TOKEN - state.credit;
        let wait_ns = missing.div_ceil(u128::from(self.config.requests_per_minute));
        Some(Duration::from_nanos(u64::try_from(wait_ns).unwrap_or(u64::MAX)))
    }

    fn daily_exhausted(&self, state: &BucketState) -> bool {
        self.config
            .requests_per_day
            .is_some_and(|limit| state.daily_count >= limit)
    }

    fn refresh(&self, state: &mut BucketState, now: Instant) {
        let elapsed_ns = now.saturating_duration_since(state.last_refill_at).as_nanos();
        if elapsed_ns > 0 {
            let accrued = elapsed_ns.saturating_mul(u128::from(self.config.requests_per_minute));
            state.credit = state.credit.saturating_add(accrued).min(self.config.capacity());
            state.last_refill_at = now;
        }

        if let Some(reset_at) = state.daily_reset_at {
            if now >= reset_at {
                info!(
                    provider = %self.provider,
                    used = state.daily_count,
                    "daily request window reset"
                );
                state.daily_count = 0;
                state.daily_reset_at = None;
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(provider = %self.provider, "rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn whole_tokens(credit: u128) -> u32 {
    u32::try_from(credit / TOKEN).unwrap_or(u32::MAX)
}

/// Process-wide set of limiters, one per provider.
///
/// Built once and handed to every orchestrator so concurrent and sequential
/// runs against the same provider draw from one bucket.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    clock: Arc<dyn Clock>,
    limiters: Mutex<HashMap<ProviderId, Arc<RateLimiter>>>,
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RateLimiterRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Return the provider's limiter, creating it with `config` on first use.
    ///
    /// Later calls return the existing instance and ignore `config`.
    pub fn limiter(
        &self,
        provider: ProviderId,
        config: RateLimitConfig,
    ) -> Result<Arc<RateLimiter>, ValidationError> {
        let mut limiters = self.lock_limiters();
        if let Some(existing) = limiters.get(&provider) {
            return Ok(Arc::clone(existing));
        }

        let limiter = Arc::new(RateLimiter::with_clock(
            provider,
            config,
            Arc::clone(&self.clock),
        )?);
        debug!(
            provider = %provider,
            rpm = config.requests_per_minute,
            daily = ?config.requests_per_day,
            "registered rate limiter"
        );
        limiters.insert(provider, Arc::clone(&limiter));
        Ok(limiter)
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<RateLimiter>> {
        self.lock_limiters().get(&provider).cloned()
    }

    pub fn statuses(&self) -> Vec<RateLimiterStatus> {
        let limiters = self.lock_limiters();
        ProviderId::ALL
            .iter()
            .filter_map(|provider| limiters.get(provider).map(|limiter| limiter.status()))
            .collect()
    }

    fn lock_limiters(&self) -> MutexGuard<'_, HashMap<ProviderId, Arc<RateLimiter>>> {
        self.limiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(config: RateLimitConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(ProviderId::Finnhub, config, clock.clone())
            .expect("valid config");
        (limiter, clock)
    }

    #[test]
    fn rejects_zero_requests_per_minute() {
        let err = RateLimiter::new(ProviderId::Finnhub, RateLimitConfig::per_minute(0))
            .expect_err("must fail");
        assert_eq!(err, ValidationError::ZeroRequestsPerMinute);
    }

    #[test]
    fn bucket_starts_full_and_refills_after_one_minute() {
        let (limiter, clock) = limiter(RateLimitConfig::per_minute(5));

        for _ in 0..5 {
            assert!(limiter.consume_token());
        }
        assert!(!limiter.consume_token());
        assert_eq!(limiter.status().tokens_remaining, 0);

        // one token per 12s at rpm=5
        clock.advance(Duration::from_millis(11_999));
        assert!(!limiter.can_make_request());

        clock.advance(Duration::from_millis(1));
        assert!(limiter.can_make_request());

        clock.advance(Duration::from_millis(48_000));
        assert_eq!(limiter.status().tokens_remaining, 5);
    }

    #[test]
    fn refill_is_continuous_and_capped() {
        let (limiter, clock) = limiter(RateLimitConfig::per_minute(60));
        for _ in 0..60 {
            assert!(limiter.consume_token());
        }

        clock.advance(Duration::from_millis(2_500));
        assert_eq!(limiter.status().tokens_remaining, 2);

        clock.advance(Duration::from_secs(600));
        assert_eq!(limiter.status().tokens_remaining, 60);
    }

    #[test]
    fn fine_grained_polling_refills_exactly_one_minute() {
        for rpm in [3, 7, 11, 60, 97, 100] {
            let (limiter, clock) = limiter(RateLimitConfig::per_minute(rpm));
            for _ in 0..rpm {
                assert!(limiter.consume_token());
            }

            for _ in 0..60_000 {
                clock.advance(Duration::from_millis(1));
                limiter.can_make_request();
            }
            assert_eq!(limiter.status().tokens_remaining, rpm, "rpm={rpm}");
        }
    }

    #[test]
    fn uneven_steps_refill_exactly_one_minute() {
        let (limiter, clock) = limiter(RateLimitConfig::per_minute(7));
        for _ in 0..7 {
            assert!(limiter.consume_token());
        }

        for _ in 0..8_571 {
            clock.advance(Duration::from_millis(7));
            limiter.retry_after();
        }
        assert_eq!(limiter.status().tokens_remaining, 6);
        clock.advance(Duration::from_millis(3));
        assert_eq!(limiter.status().tokens_remaining, 7);
    }

    #[test]
    fn daily_cap_outlasts_minute_refill_until_window_closes() {
        let (limiter, clock) = limiter(RateLimitConfig::per_minute(100).with_daily_cap(3));

        for _ in 0..3 {
            assert!(limiter.consume_token());
        }
        assert!(!limiter.consume_token());

        clock.advance(Duration::from_secs(60));
        assert!(!limiter.consume_token());
        assert_eq!(limiter.status().daily_remaining, Some(0));
        assert_eq!(limiter.status().tokens_remaining, 100);

        clock.advance(DAILY_WINDOW);
        assert!(limiter.can_make_request());
        assert_eq!(limiter.status().daily_remaining, Some(3));
    }

    #[test]
    fn daily_denial_leaves_minute_bucket_untouched() {
        let (limiter, _clock) = limiter(RateLimitConfig::per_minute(10).with_daily_cap(2));
        assert!(limiter.consume_token());
        assert!(limiter.consume_token());

        for _ in 0..5 {
            assert!(!limiter.consume_token());
        }
        assert_eq!(limiter.status().tokens_remaining, 8);
    }

    #[test]
    fn retry_after_reports_minute_and_daily_waits() {
        let (limiter, clock) = limiter(RateLimitConfig::per_minute(2).with_daily_cap(3));
        assert_eq!(limiter.retry_after(), None);

        assert!(limiter.consume_token());
        assert!(limiter.consume_token());
        assert_eq!(limiter.retry_after(), Some(Duration::from_secs(30)));

        clock.advance(Duration::from_secs(30));
        assert!(limiter.consume_token());

        let wait = limiter.retry_after().expect("daily cap reached");
        assert_eq!(wait, DAILY_WINDOW - Duration::from_secs(30));
    }

    #[test]
    fn registry_shares_one_limiter_per_provider() {
        let registry = RateLimiterRegistry::new(Arc::new(ManualClock::new()));
        let first = registry
            .limiter(ProviderId::Fmp, RateLimitConfig::per_minute(3))
            .expect("limiter");
        let second = registry
            .limiter(ProviderId::Fmp, RateLimitConfig::per_minute(50))
            .expect("limiter");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().requests_per_minute, 3);
        assert!(registry.get(ProviderId::Finnhub).is_none());
        assert_eq!(registry.statuses().len(), 1);
    }
}

//! Behavior-driven tests for provider rate limiting
//!
//! These tests verify how the limiter paces requests against a provider's
//! free-tier quota, and that the quota is shared across refresh runs.

use std::sync::Arc;
use std::time::Duration;

use stockpulse_core::DAILY_WINDOW;
use stockpulse_tests::*;

fn limiter(config: RateLimitConfig) -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let limiter = RateLimiter::with_clock(ProviderId::Finnhub, config, clock.clone())
        .expect("valid limiter config");
    (limiter, clock)
}

// =============================================================================
// Rate Limiter: Minute Bucket
// =============================================================================

#[test]
fn when_minute_budget_is_spent_next_request_is_denied_until_refill() {
    // Given: A limiter allowing 5 requests per minute
    let (limiter, clock) = limiter(RateLimitConfig::per_minute(5));

    // When: Five requests go out back to back
    for _ in 0..5 {
        assert!(limiter.consume_token(), "initial burst should be allowed");
    }

    // Then: The sixth is denied, and a single permit returns after 12 seconds
    assert!(!limiter.consume_token());
    assert_eq!(limiter.retry_after(), Some(Duration::from_secs(12)));

    clock.advance(Duration::from_secs(12));
    assert!(limiter.consume_token());
    assert!(!limiter.consume_token());
}

#[test]
fn when_idle_for_a_full_minute_bucket_refills_to_capacity_only() {
    // Given: An exhausted 5 rpm limiter
    let (limiter, clock) = limiter(RateLimitConfig::per_minute(5));
    for _ in 0..5 {
        limiter.consume_token();
    }

    // When: Ten minutes pass without traffic
    clock.advance(Duration::from_secs(600));

    // Then: The bucket holds exactly its capacity, not ten minutes' worth
    assert_eq!(limiter.status().tokens_remaining, 5);
}

#[test]
fn when_workers_poll_every_millisecond_a_full_minute_still_refills_the_bucket() {
    for rpm in [3, 60, 100] {
        // Given: An exhausted limiter
        let (limiter, clock) = limiter(RateLimitConfig::per_minute(rpm));
        for _ in 0..rpm {
            assert!(limiter.consume_token());
        }

        // When: A minute passes one millisecond at a time with a check each step
        for _ in 0..60_000 {
            clock.advance(Duration::from_millis(1));
            limiter.can_make_request();
            limiter.retry_after();
        }

        // Then: The bucket is exactly full again
        assert_eq!(limiter.status().tokens_remaining, rpm, "rpm={rpm}");
        assert_eq!(limiter.retry_after(), None);
    }
}

#[test]
fn when_requests_are_denied_status_is_unchanged() {
    // Given: A drained limiter
    let (limiter, _clock) = limiter(RateLimitConfig::per_minute(2));
    limiter.consume_token();
    limiter.consume_token();
    let before = limiter.status();

    // When: The caller keeps asking
    for _ in 0..10 {
        assert!(!limiter.consume_token());
    }

    // Then: Denials neither go negative nor consume anything
    assert_eq!(limiter.status(), before);
    assert!(!limiter.can_make_request());
}

// =============================================================================
// Rate Limiter: Daily Cap
// =============================================================================

#[test]
fn when_daily_cap_is_reached_requests_are_denied_despite_minute_tokens() {
    // Given: 100 rpm but only 3 requests per day
    let (limiter, clock) = limiter(RateLimitConfig::per_minute(100).with_daily_cap(3));

    // When: The daily cap is used up
    for _ in 0..3 {
        assert!(limiter.consume_token());
    }

    // Then: The next request is denied while minute tokens remain
    assert!(!limiter.consume_token());
    let status = limiter.status();
    assert_eq!(status.daily_remaining, Some(0));
    assert_eq!(status.tokens_remaining, 97);

    // And: The window closes 24 hours after the first request
    clock.advance(DAILY_WINDOW - Duration::from_secs(1));
    assert!(!limiter.can_make_request());
    clock.advance(Duration::from_secs(1));
    assert!(limiter.consume_token());
    assert_eq!(limiter.status().daily_remaining, Some(2));
}

#[test]
fn when_quota_is_zero_limiter_is_rejected() {
    // Given/When: Limiters configured with an empty quota
    let no_minute = RateLimiter::new(ProviderId::Fmp, RateLimitConfig::per_minute(0));
    let no_day = RateLimiter::new(
        ProviderId::Fmp,
        RateLimitConfig::per_minute(10).with_daily_cap(0),
    );

    // Then: Both are refused up front
    assert!(no_minute.is_err());
    assert!(no_day.is_err());
}

// =============================================================================
// Rate Limiter: Shared Across Runs
// =============================================================================

#[tokio::test]
async fn when_one_run_spends_daily_quota_next_run_is_throttled() {
    // Given: A daily cap of 3 requests (one symbol's worth) and one registry
    let limiters = RateLimiterRegistry::new(Arc::new(ManualClock::new()));
    let policy = ProviderPolicy::finnhub_default().with_overrides(None, Some(3));
    let store = MemoryStore::new();

    let first = nasdaq_orchestrator(
        Arc::new(store.clone()),
        Arc::new(MockSource::new(ProviderId::Finnhub)),
        &policy,
        &limiters,
        &["AAPL"],
    );
    let second = nasdaq_orchestrator(
        Arc::new(store.clone()),
        Arc::new(MockSource::new(ProviderId::Finnhub)),
        &policy,
        &limiters,
        &["AMZN"],
    );

    // When: Two runs execute back to back
    let spent = first
        .refresh_stocks_in_range('A', 'A')
        .await
        .expect("first run completes");
    let throttled = second
        .refresh_stocks_in_range('A', 'A')
        .await
        .expect("second run completes");

    // Then: The first succeeds and the second finds the daily quota gone
    assert_eq!((spent.processed, spent.failed), (1, 0));
    assert_eq!((throttled.processed, throttled.failed), (0, 1));
    assert!(throttled.errors[0].starts_with("AMZN: rate limited: quote:"));
    assert!(throttled.success, "throttling is a per-symbol failure, not a run failure");

    let status = limiters.get(ProviderId::Finnhub).expect("limiter").status();
    assert_eq!(status.daily_remaining, Some(0));
}

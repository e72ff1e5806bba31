use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limiter::RateLimitConfig;
use crate::retry::{Backoff, RetryPolicy};
use crate::ProviderId;

/// Quota, pacing and retry defaults for one provider's free tier.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub requests_per_minute: u32,
    pub requests_per_day: Option<u32>,
    pub burst_per_second: u32,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub circuit: CircuitBreakerConfig,
}

impl ProviderPolicy {
    pub fn finnhub_default() -> Self {
        Self {
            provider_id: ProviderId::Finnhub,
            requests_per_minute: 60,
            requests_per_day: None,
            burst_per_second: 5,
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_retries: 2,
                backoff: Backoff {
                    base: Duration::from_millis(500),
                    factor: 2.0,
                    max: Duration::from_secs(5),
                    jitter: true,
                },
            },
            circuit: CircuitBreakerConfig::default(),
        }
    }

    pub fn fmp_default() -> Self {
        Self {
            provider_id: ProviderId::Fmp,
            requests_per_minute: 30,
            requests_per_day: Some(250),
            burst_per_second: 3,
            request_timeout: Duration::from_secs(8),
            retry: RetryPolicy {
                max_retries: 1,
                backoff: Backoff {
                    base: Duration::from_secs(1),
                    factor: 2.0,
                    max: Duration::from_secs(8),
                    jitter: true,
                },
            },
            circuit: CircuitBreakerConfig::default(),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Finnhub => Self::finnhub_default(),
            ProviderId::Fmp => Self::fmp_default(),
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.requests_per_minute,
            requests_per_day: self.requests_per_day,
        }
    }

    /// Apply operator overrides; `None` keeps the default.
    pub fn with_overrides(
        mut self,
        requests_per_minute: Option<u32>,
        requests_per_day: Option<u32>,
    ) -> Self {
        if let Some(rpm) = requests_per_minute {
            self.requests_per_minute = rpm;
        }
        if let Some(daily) = requests_per_day {
            self.requests_per_day = Some(daily);
        }
        self
    }
}

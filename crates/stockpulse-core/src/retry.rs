//! Retry policy for transient provider failures.

use std::time::Duration;

/// Exponential backoff with optional +/-50% jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            factor: 1.0,
            max: delay,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        let scale = self.factor.powi(attempt.min(i32::MAX as u32) as i32);
        let seconds = (self.base.as_secs_f64() * scale).min(self.max.as_secs_f64());
        let delay = Duration::from_secs_f64(seconds.max(0.0));

        if !self.jitter {
            return delay;
        }

        let millis = delay.as_millis() as u64;
        let spread = millis / 2;
        let jittered = millis - spread + fastrand::u64(0..=spread * 2);
        Duration::from_millis(jittered)
    }
}

/// How many times a retryable call is attempted again, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before the next try, or `None` once `retries_done` is exhausted.
    pub fn next_delay(&self, retries_done: u32) -> Option<Duration> {
        (retries_done < self.max_retries).then(|| self.backoff.delay(retries_done))
    }
}

use std::time::Duration;

use serde::Serialize;

/// Run-level knobs. Provider quotas live in [`crate::ProviderPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshConfig {
    /// Symbols refreshed at once.
    pub concurrency: usize,
    /// Wall-clock ceiling for the whole run (hard deadline).
    pub run_budget: Duration,
    /// No new symbol starts once less than this is left of `run_budget`.
    pub deadline_margin: Duration,
    /// Longest a single symbol may wait for limiter permits and retries.
    pub symbol_wait_budget: Duration,
    /// Error entries kept in reports and run history.
    pub max_reported_errors: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_budget: Duration::from_secs(280),
            deadline_margin: Duration::from_secs(5),
            symbol_wait_budget: Duration::from_secs(65),
            max_reported_errors: 50,
        }
    }
}

impl RefreshConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_run_budget(mut self, run_budget: Duration) -> Self {
        self.run_budget = run_budget;
        self
    }

    /// Offset from run start after which no symbol is started.
    pub fn soft_deadline(&self) -> Duration {
        self.run_budget.saturating_sub(self.deadline_margin)
    }
}

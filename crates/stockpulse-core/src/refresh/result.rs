use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UtcDateTime;

/// Aggregate outcome of one refresh run.
///
/// `processed + failed == total_symbols` always holds. `errors` carries one
/// entry per failed symbol in completion order and is never truncated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResult {
    pub run_id: Uuid,
    pub label: String,
    pub total_symbols: usize,
    pub processed: usize,
    pub failed: usize,
    pub duration: String,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub success: bool,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
}

impl RefreshResult {
    /// Result of a run over an empty symbol set.
    #[cfg(test)]
    pub(crate) fn empty(label: impl Into<String>) -> Self {
        let now = UtcDateTime::now();
        Self {
            run_id: Uuid::new_v4(),
            label: label.into(),
            total_symbols: 0,
            processed: 0,
            failed: 0,
            duration: format_duration(Duration::ZERO),
            duration_ms: 0,
            errors: Vec::new(),
            success: true,
            started_at: now,
            finished_at: now,
        }
    }

    /// Transport view with at most `max_errors` error entries.
    pub fn report(&self, max_errors: usize) -> RefreshReport {
        let shown = self.errors.len().min(max_errors);
        RefreshReport {
            run_id: self.run_id,
            label: self.label.clone(),
            total_symbols: self.total_symbols,
            processed: self.processed,
            failed: self.failed,
            duration: self.duration.clone(),
            duration_ms: self.duration_ms,
            errors: self.errors[..shown].to_vec(),
            errors_truncated: self.errors.len() - shown,
            success: self.success,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// What a trigger returns to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub run_id: Uuid,
    pub label: String,
    pub total_symbols: usize,
    pub processed: usize,
    pub failed: usize,
    pub duration: String,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub errors_truncated: usize,
    pub success: bool,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
}

/// One row of run history as handed to and read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub label: String,
    pub total_symbols: u64,
    pub processed: u64,
    pub failed: u64,
    pub success: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub errors_truncated: u64,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
}

impl RunRecord {
    pub fn from_result(result: &RefreshResult, max_errors: usize) -> Self {
        let report = result.report(max_errors);
        Self {
            run_id: report.run_id,
            label: report.label,
            total_symbols: report.total_symbols as u64,
            processed: report.processed as u64,
            failed: report.failed as u64,
            success: report.success,
            duration_ms: report.duration_ms,
            errors: report.errors,
            errors_truncated: report.errors_truncated as u64,
            started_at: report.started_at,
            finished_at: report.finished_at,
        }
    }
}

/// `850ms`, `12.3s`, `4m 05s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        return format!("{millis}ms");
    }
    if millis < 60_000 {
        return format!("{:.1}s", duration.as_secs_f64());
    }
    let seconds = duration.as_secs();
    format!("{}m {:02}s", seconds / 60, seconds % 60)
}

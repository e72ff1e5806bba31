//! Persistence seam for refresh runs.
//!
//! [`RefreshStore`] is what the orchestrator writes to. The DuckDB
//! [`Warehouse`] implements it by moving each call onto the blocking pool;
//! [`MemoryStore`] keeps everything in process for tests and dry runs.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use stockpulse_warehouse::{RunRow, StockRow, Warehouse, WarehouseError};
use thiserror::Error;
use uuid::Uuid;

use crate::refresh::RunRecord;
use crate::{ProviderId, StockRecord, Symbol, UtcDateTime};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("stored row is invalid: {0}")]
    Corrupt(String),

    #[error("store rejected write: {0}")]
    Rejected(String),
}

pub trait RefreshStore: Send + Sync {
    /// Insert or replace the row for `record.symbol`.
    fn upsert_stock<'a>(&'a self, record: &'a StockRecord) -> StoreFuture<'a, ()>;

    fn record_run<'a>(&'a self, run: &'a RunRecord) -> StoreFuture<'a, ()>;

    /// Latest `updated_at` across all stored stocks.
    fn last_updated(&self) -> StoreFuture<'_, Option<UtcDateTime>>;

    fn stock_count(&self) -> StoreFuture<'_, u64>;

    /// Newest first.
    fn run_history(&self, limit: usize) -> StoreFuture<'_, Vec<RunRecord>>;
}

impl RefreshStore for Warehouse {
    fn upsert_stock<'a>(&'a self, record: &'a StockRecord) -> StoreFuture<'a, ()> {
        let row = stock_row(record);
        let warehouse = self.clone();
        Box::pin(blocking(move || warehouse.upsert_stock(&row)))
    }

    fn record_run<'a>(&'a self, run: &'a RunRecord) -> StoreFuture<'a, ()> {
        let row = run_row(run);
        let warehouse = self.clone();
        Box::pin(blocking(move || warehouse.record_run(&row)))
    }

    fn last_updated(&self) -> StoreFuture<'_, Option<UtcDateTime>> {
        let warehouse = self.clone();
        Box::pin(async move {
            let value = blocking(move || warehouse.last_updated()).await?;
            value
                .map(|value| {
                    UtcDateTime::parse(&value).map_err(|e| StoreError::Corrupt(e.to_string()))
                })
                .transpose()
        })
    }

    fn stock_count(&self) -> StoreFuture<'_, u64> {
        let warehouse = self.clone();
        Box::pin(blocking(move || warehouse.stock_count()))
    }

    fn run_history(&self, limit: usize) -> StoreFuture<'_, Vec<RunRecord>> {
        let warehouse = self.clone();
        Box::pin(async move {
            let rows = blocking(move || warehouse.run_history(limit)).await?;
            rows.into_iter().map(run_record).collect()
        })
    }
}

async fn blocking<T, F>(operation: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, WarehouseError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
        .map_err(StoreError::from)
}

pub fn stock_row(record: &StockRecord) -> StockRow {
    StockRow {
        symbol: record.symbol.to_string(),
        universe: record.universe.clone(),
        name: record.name.clone(),
        exchange: record.exchange.clone(),
        currency: record.currency.clone(),
        sector: record.sector.clone(),
        industry: record.industry.clone(),
        country: record.country.clone(),
        price: record.price,
        change_percent: record.change_percent,
        market_cap: record.market_cap,
        pe_ratio: record.pe_ratio,
        revenue_growth_pct: record.revenue_growth_pct,
        eps_growth_pct: record.eps_growth_pct,
        week52_high: record.week52_high,
        week52_low: record.week52_low,
        source: record.source.as_str().to_owned(),
        updated_at: record.updated_at.format_rfc3339(),
    }
}

pub fn stock_record(row: StockRow) -> Result<StockRecord, StoreError> {
    let corrupt = |e: crate::ValidationError| StoreError::Corrupt(e.to_string());
    Ok(StockRecord {
        symbol: Symbol::parse(&row.symbol).map_err(corrupt)?,
        universe: row.universe,
        name: row.name,
        exchange: row.exchange,
        currency: row.currency,
        sector: row.sector,
        industry: row.industry,
        country: row.country,
        price: row.price,
        change_percent: row.change_percent,
        market_cap: row.market_cap,
        pe_ratio: row.pe_ratio,
        revenue_growth_pct: row.revenue_growth_pct,
        eps_growth_pct: row.eps_growth_pct,
        week52_high: row.week52_high,
        week52_low: row.week52_low,
        source: row.source.parse::<ProviderId>().map_err(corrupt)?,
        updated_at: UtcDateTime::parse(&row.updated_at).map_err(corrupt)?,
    })
}

fn run_row(run: &RunRecord) -> RunRow {
    RunRow {
        run_id: run.run_id.to_string(),
        label: run.label.clone(),
        total_symbols: run.total_symbols,
        processed: run.processed,
        failed: run.failed,
        success: run.success,
        duration_ms: run.duration_ms,
        errors: run.errors.clone(),
        errors_truncated: run.errors_truncated,
        started_at: run.started_at.format_rfc3339(),
        finished_at: run.finished_at.format_rfc3339(),
    }
}

fn run_record(row: RunRow) -> Result<RunRecord, StoreError> {
    let corrupt = |e: crate::ValidationError| StoreError::Corrupt(e.to_string());
    Ok(RunRecord {
        run_id: Uuid::parse_str(&row.run_id)
            .map_err(|e| StoreError::Corrupt(format!("run id '{}': {e}", row.run_id)))?,
        label: row.label,
        total_symbols: row.total_symbols,
        processed: row.processed,
        failed: row.failed,
        success: row.success,
        duration_ms: row.duration_ms,
        errors: row.errors,
        errors_truncated: row.errors_truncated,
        started_at: UtcDateTime::parse(&row.started_at).map_err(corrupt)?,
        finished_at: UtcDateTime::parse(&row.finished_at).map_err(corrupt)?,
    })
}

#[derive(Debug, Default)]
struct MemoryInner {
    stocks: BTreeMap<Symbol, StockRecord>,
    runs: Vec<RunRecord>,
    reject_symbols: HashSet<Symbol>,
    reject_runs: bool,
}

/// In-process store with switchable write failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts for `symbol` fail from now on.
    pub fn reject_symbol(&self, symbol: &Symbol) {
        self.lock().reject_symbols.insert(symbol.clone());
    }

    /// Recording runs fails from now on.
    pub fn reject_runs(&self) {
        self.lock().reject_runs = true;
    }

    pub fn stock(&self, symbol: &Symbol) -> Option<StockRecord> {
        self.lock().stocks.get(symbol).cloned()
    }

    pub fn stocks(&self) -> Vec<StockRecord> {
        self.lock().stocks.values().cloned().collect()
    }

    /// Runs in the order they were recorded.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock().runs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RefreshStore for MemoryStore {
    fn upsert_stock<'a>(&'a self, record: &'a StockRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.reject_symbols.contains(&record.symbol) {
                return Err(StoreError::Rejected(format!("upsert {}", record.symbol)));
            }
            inner.stocks.insert(record.symbol.clone(), record.clone());
            Ok(())
        })
    }

    fn record_run<'a>(&'a self, run: &'a RunRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.reject_runs {
                return Err(StoreError::Rejected(format!("run {}", run.run_id)));
            }
            inner.runs.push(run.clone());
            Ok(())
        })
    }

    fn last_updated(&self) -> StoreFuture<'_, Option<UtcDateTime>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .stocks
                .values()
                .map(|record| record.updated_at)
                .max())
        })
    }

    fn stock_count(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move { Ok(self.lock().stocks.len() as u64) })
    }

    fn run_history(&self, limit: usize) -> StoreFuture<'_, Vec<RunRecord>> {
        Box::pin(async move {
            let mut runs = self.lock().runs.clone();
            runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            runs.truncate(limit);
            Ok(runs)
        })
    }
}

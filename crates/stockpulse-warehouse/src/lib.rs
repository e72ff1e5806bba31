//! # stockpulse Warehouse
//!
//! DuckDB storage for refreshed stock rows and refresh-run history.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `stocks` | One row per symbol, replaced on every successful refresh |
//! | `refresh_runs` | Append-only history of refresh results |
//! | `schema_migrations` | Applied migration versions |
//!
//! All values are bound as statement parameters. Timestamps are stored as
//! RFC3339 UTC text, which sorts chronologically.

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub stockpulse_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::under(resolve_stockpulse_home())
    }
}

impl WarehouseConfig {
    /// Default layout below a given home directory.
    pub fn under(stockpulse_home: impl Into<PathBuf>) -> Self {
        let stockpulse_home = stockpulse_home.into();
        let db_path = stockpulse_home.join("warehouse.duckdb");
        Self {
            stockpulse_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Row shape of the `stocks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRow {
    pub symbol: String,
    pub universe: String,
    pub name: String,
    pub exchange: Option<String>,
    pub currency: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub price: f64,
    pub change_percent: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub revenue_growth_pct: Option<f64>,
    pub eps_growth_pct: Option<f64>,
    pub week52_high: Option<f64>,
    pub week52_low: Option<f64>,
    pub source: String,
    pub updated_at: String,
}

/// Row shape of the `refresh_runs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRow {
    pub run_id: String,
    pub label: String,
    pub total_symbols: u64,
    pub processed: u64,
    pub failed: u64,
    pub success: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub errors_truncated: u64,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("db_path", &self.config.db_path)
            .finish()
    }
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Insert or replace the row for `row.symbol`.
    pub fn upsert_stock(&self, row: &StockRow) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        write_stock(&connection, row)
    }

    /// Upsert many rows in one transaction.
    pub fn upsert_stocks(&self, rows: &[StockRow]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = rows
            .iter()
            .try_for_each(|row| write_stock(&connection, row))
            .map(|()| rows.len());
        finalize_transaction(&connection, result)
    }

    pub fn get_stock(&self, symbol: &str) -> Result<Option<StockRow>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, universe, name, exchange, currency, sector, industry, country, \
             price, change_percent, market_cap, pe_ratio, revenue_growth_pct, eps_growth_pct, \
             week52_high, week52_low, source, updated_at \
             FROM stocks WHERE symbol = ?",
        )?;
        let mut rows = statement.query(params![symbol])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_stock(row)?)),
            None => Ok(None),
        }
    }

    pub fn record_run(&self, run: &RunRow) -> Result<(), WarehouseError> {
        let errors = serde_json::to_string(&run.errors)
            .map_err(|e| WarehouseError::InvalidData(format!("run errors: {e}")))?;

        let connection = self.manager.acquire()?;
        connection.execute(
            "INSERT INTO refresh_runs \
             (run_id, label, total_symbols, processed, failed, success, duration_ms, errors, \
              errors_truncated, started_at, finished_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                run.run_id,
                run.label,
                to_i64(run.total_symbols)?,
                to_i64(run.processed)?,
                to_i64(run.failed)?,
                run.success,
                to_i64(run.duration_ms)?,
                errors,
                to_i64(run.errors_truncated)?,
                run.started_at,
                run.finished_at,
            ],
        )?;
        debug!(run_id = %run.run_id, label = %run.label, "recorded refresh run");
        Ok(())
    }

    /// Most recent `updated_at` across all stocks.
    pub fn last_updated(&self) -> Result<Option<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let value: Option<String> =
            connection.query_row("SELECT MAX(updated_at) FROM stocks", [], |row| row.get(0))?;
        Ok(value)
    }

    pub fn stock_count(&self) -> Result<u64, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count: i64 = connection.query_row("SELECT COUNT(*) FROM stocks", [], |row| row.get(0))?;
        to_u64(count)
    }

    /// Stock counts grouped by universe, ordered by universe name.
    pub fn stock_count_by_universe(&self) -> Result<Vec<(String, u64)>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection
            .prepare("SELECT universe, COUNT(*) FROM stocks GROUP BY universe ORDER BY universe")?;
        let mut rows = statement.query([])?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            let universe: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.push((universe, to_u64(count)?));
        }
        Ok(counts)
    }

    /// Newest runs first.
    pub fn run_history(&self, limit: usize) -> Result<Vec<RunRow>, WarehouseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT run_id, label, total_symbols, processed, failed, success, duration_ms, \
             errors, errors_truncated, started_at, finished_at \
             FROM refresh_runs ORDER BY started_at DESC, finished_at DESC LIMIT ?",
        )?;
        let mut rows = statement.query(params![limit])?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            runs.push(read_run(row)?);
        }
        Ok(runs)
    }
}

fn write_stock(connection: &Connection, row: &StockRow) -> Result<(), WarehouseError> {
    connection.execute(
        "INSERT OR REPLACE INTO stocks \
         (symbol, universe, name, exchange, currency, sector, industry, country, price, \
          change_percent, market_cap, pe_ratio, revenue_growth_pct, eps_growth_pct, \
          week52_high, week52_low, source, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            row.symbol,
            row.universe,
            row.name,
            row.exchange,
            row.currency,
            row.sector,
            row.industry,
            row.country,
            row.price,
            row.change_percent,
            row.market_cap,
            row.pe_ratio,
            row.revenue_growth_pct,
            row.eps_growth_pct,
            row.week52_high,
            row.week52_low,
            row.source,
            row.updated_at,
        ],
    )?;
    Ok(())
}

fn read_stock(row: &Row<'_>) -> Result<StockRow, WarehouseError> {
    Ok(StockRow {
        symbol: row.get(0)?,
        universe: row.get(1)?,
        name: row.get(2)?,
        exchange: row.get(3)?,
        currency: row.get(4)?,
        sector: row.get(5)?,
        industry: row.get(6)?,
        country: row.get(7)?,
        price: row.get(8)?,
        change_percent: row.get(9)?,
        market_cap: row.get(10)?,
        pe_ratio: row.get(11)?,
        revenue_growth_pct: row.get(12)?,
        eps_growth_pct: row.get(13)?,
        week52_high: row.get(14)?,
        week52_low: row.get(15)?,
        source: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn read_run(row: &Row<'_>) -> Result<RunRow, WarehouseError> {
    let errors: String = row.get(7)?;
    let errors: Vec<String> = serde_json::from_str(&errors)
        .map_err(|e| WarehouseError::InvalidData(format!("run errors: {e}")))?;

    Ok(RunRow {
        run_id: row.get(0)?,
        label: row.get(1)?,
        total_symbols: to_u64(row.get(2)?)?,
        processed: to_u64(row.get(3)?)?,
        failed: to_u64(row.get(4)?)?,
        success: row.get(5)?,
        duration_ms: to_u64(row.get(6)?)?,
        errors,
        errors_truncated: to_u64(row.get(8)?)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
    })
}

fn to_i64(value: u64) -> Result<i64, WarehouseError> {
    i64::try_from(value).map_err(|_| WarehouseError::InvalidData(format!("{value} exceeds BIGINT")))
}

fn to_u64(value: i64) -> Result<u64, WarehouseError> {
    u64::try_from(value).map_err(|_| WarehouseError::InvalidData(format!("negative count {value}")))
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_stockpulse_home() -> PathBuf {
    if let Some(path) = env::var_os("STOCKPULSE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".stockpulse");
    }

    PathBuf::from(".stockpulse")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn warehouse(temp: &tempfile::TempDir) -> Warehouse {
        let mut config = WarehouseConfig::under(temp.path().join("home"));
        config.max_pool_size = 2;
        Warehouse::open(config).expect("warehouse open")
    }

    fn stock(symbol: &str, price: f64, updated_at: &str) -> StockRow {
        StockRow {
            symbol: symbol.to_owned(),
            universe: String::from("nasdaq"),
            name: format!("{symbol} Inc"),
            exchange: Some(String::from("NASDAQ")),
            currency: String::from("USD"),
            sector: None,
            industry: Some(String::from("Software")),
            country: None,
            price,
            change_percent: Some(1.25),
            market_cap: Some(1.0e9),
            pe_ratio: None,
            revenue_growth_pct: Some(12.0),
            eps_growth_pct: None,
            week52_high: None,
            week52_low: None,
            source: String::from("finnhub"),
            updated_at: updated_at.to_owned(),
        }
    }

    fn run(run_id: &str, started_at: &str) -> RunRow {
        RunRow {
            run_id: run_id.to_owned(),
            label: String::from("nasdaq A-M"),
            total_symbols: 3,
            processed: 2,
            failed: 1,
            success: true,
            duration_ms: 1_250,
            errors: vec![String::from("AXP: provider: upstream down")],
            errors_truncated: 0,
            started_at: started_at.to_owned(),
            finished_at: started_at.to_owned(),
        }
    }

    #[test]
    fn upsert_replaces_existing_symbol() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(&temp);

        warehouse
            .upsert_stock(&stock("AAPL", 180.0, "2024-06-03T20:00:00Z"))
            .expect("first upsert");
        warehouse
            .upsert_stock(&stock("AAPL", 190.0, "2024-06-04T20:00:00Z"))
            .expect("second upsert");

        assert_eq!(warehouse.stock_count().expect("count"), 1);
        let stored = warehouse.get_stock("AAPL").expect("query").expect("row");
        assert_eq!(stored.price, 190.0);
        assert_eq!(stored.pe_ratio, None);
        assert_eq!(
            warehouse.last_updated().expect("last updated").as_deref(),
            Some("2024-06-04T20:00:00Z")
        );
    }

    #[test]
    fn empty_warehouse_has_no_last_updated() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(&temp);

        assert_eq!(warehouse.last_updated().expect("query"), None);
        assert_eq!(warehouse.stock_count().expect("count"), 0);
        assert!(warehouse.run_history(10).expect("history").is_empty());
    }

    #[test]
    fn run_history_is_newest_first_and_limited() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(&temp);

        warehouse.record_run(&run("r1", "2024-06-01T00:00:00Z")).expect("r1");
        warehouse.record_run(&run("r2", "2024-06-02T00:00:00Z")).expect("r2");
        warehouse.record_run(&run("r3", "2024-06-03T00:00:00Z")).expect("r3");

        let history = warehouse.run_history(2).expect("history");
        let ids: Vec<&str> = history.iter().map(|run| run.run_id.as_str()).collect();
        assert_eq!(ids, ["r3", "r2"]);
        assert_eq!(history[0].errors, ["AXP: provider: upstream down"]);
    }

    #[test]
    fn hostile_symbol_text_is_stored_verbatim() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(&temp);
        let hostile = "X'; DROP TABLE stocks; --";

        warehouse
            .upsert_stocks(&[stock(hostile, 1.0, "2024-06-03T20:00:00Z"), stock("MSFT", 2.0, "2024-06-03T20:00:00Z")])
            .expect("batch upsert");

        assert_eq!(warehouse.stock_count().expect("count"), 2);
        assert!(warehouse.get_stock(hostile).expect("query").is_some());
        assert_eq!(
            warehouse.stock_count_by_universe().expect("grouped"),
            vec![(String::from("nasdaq"), 2)]
        );
    }

    #[test]
    fn reopening_keeps_data() {
        let temp = tempdir().expect("tempdir");
        {
            let warehouse = warehouse(&temp);
            warehouse
                .upsert_stock(&stock("NVDA", 900.0, "2024-06-03T20:00:00Z"))
                .expect("upsert");
        }

        let reopened = warehouse(&temp);
        assert_eq!(reopened.stock_count().expect("count"), 1);
    }
}

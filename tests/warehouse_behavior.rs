//! Behavior-driven tests for the warehouse as a refresh store
//!
//! These tests verify what a refresh run can rely on when it writes through
//! [`RefreshStore`]: upserts replace, history reads back intact, and rows that
//! no longer parse are reported instead of silently dropped.

use stockpulse_core::store::stock_record;
use stockpulse_core::{RunRecord, StoreError, UtcDateTime};
use stockpulse_tests::*;
use stockpulse_warehouse::{RunRow, StockRow};
use uuid::Uuid;

fn stock_row(symbol: &str, universe: &str, price: f64, updated_at: &str) -> StockRow {
    StockRow {
        symbol: symbol.to_owned(),
        universe: universe.to_owned(),
        name: format!("{symbol} Ltd"),
        exchange: None,
        currency: String::from("USD"),
        sector: Some(String::from("Technology")),
        industry: None,
        country: Some(String::from("US")),
        price,
        change_percent: Some(-0.4),
        market_cap: None,
        pe_ratio: Some(22.5),
        revenue_growth_pct: None,
        eps_growth_pct: None,
        week52_high: None,
        week52_low: None,
        source: String::from("finnhub"),
        updated_at: updated_at.to_owned(),
    }
}

fn run_record(label: &str, started_at: &str) -> RunRecord {
    let started_at = UtcDateTime::parse(started_at).expect("timestamp");
    RunRecord {
        run_id: Uuid::new_v4(),
        label: label.to_owned(),
        total_symbols: 40,
        processed: 38,
        failed: 2,
        success: true,
        duration_ms: 61_200,
        errors: vec![
            String::from("ACAD: rate limited: growth: finnhub limiter has no permit for another 1m 05s"),
            String::from("AXP: data error: quote: finnhub has no quote for AXP (source.not_found)"),
        ],
        errors_truncated: 0,
        started_at,
        finished_at: started_at,
    }
}

// =============================================================================
// Warehouse: Stock Upserts
// =============================================================================

#[tokio::test]
async fn when_symbol_is_refreshed_again_its_row_is_replaced() {
    // Given: An empty warehouse
    let (warehouse, _temp) = temp_warehouse();
    let store: &dyn RefreshStore = &warehouse;
    assert_eq!(store.last_updated().await.expect("last updated"), None);

    // When: The same symbol is written twice a day apart
    let first = stock_record(stock_row("AAPL", "nasdaq", 180.0, "2024-06-03T20:00:00Z"))
        .expect("valid row");
    let second = stock_record(stock_row("AAPL", "nasdaq", 190.0, "2024-06-04T20:00:00Z"))
        .expect("valid row");
    store.upsert_stock(&first).await.expect("first upsert");
    store.upsert_stock(&second).await.expect("second upsert");

    // Then: One row holds the newer values
    assert_eq!(store.stock_count().await.expect("count"), 1);
    let stored = warehouse
        .get_stock("AAPL")
        .expect("query")
        .expect("AAPL stored");
    assert_eq!(stored.price, 190.0);
    assert_eq!(
        store.last_updated().await.expect("last updated"),
        Some(UtcDateTime::parse("2024-06-04T20:00:00Z").expect("timestamp"))
    );
}

#[tokio::test]
async fn when_both_universes_are_stored_counts_are_kept_apart() {
    // Given: Stocks from both universes
    let (warehouse, _temp) = temp_warehouse();
    let store: &dyn RefreshStore = &warehouse;
    for row in [
        stock_row("AAPL", "nasdaq", 190.0, "2024-06-04T20:00:00Z"),
        stock_row("MSFT", "nasdaq", 420.0, "2024-06-04T20:00:00Z"),
        stock_row("TEVA.TA", "tlv", 5620.0, "2024-06-04T14:30:00Z"),
    ] {
        let record = stock_record(row).expect("valid row");
        store.upsert_stock(&record).await.expect("upsert");
    }

    // When: Stored counts are grouped by universe
    let mut grouped = warehouse.stock_count_by_universe().expect("grouped");
    grouped.sort();

    // Then: Each universe reports its own symbols
    assert_eq!(
        grouped,
        vec![(String::from("nasdaq"), 2), (String::from("tlv"), 1)]
    );
    assert_eq!(store.stock_count().await.expect("count"), 3);
}

// =============================================================================
// Warehouse: Run History
// =============================================================================

#[tokio::test]
async fn when_runs_are_recorded_history_reads_back_newest_first() {
    // Given: Three recorded runs on consecutive days
    let (warehouse, _temp) = temp_warehouse();
    let store: &dyn RefreshStore = &warehouse;
    let oldest = run_record("nasdaq A-M", "2024-06-01T02:00:00Z");
    let middle = run_record("nasdaq N-Z", "2024-06-02T02:00:00Z");
    let newest = run_record("tlv", "2024-06-03T02:00:00Z");
    for run in [&oldest, &middle, &newest] {
        store.record_run(run).await.expect("record run");
    }

    // When: The two most recent runs are requested
    let history = store.run_history(2).await.expect("history");

    // Then: They come back intact, newest first
    assert_eq!(history, vec![newest, middle]);
}

#[tokio::test]
async fn when_warehouse_is_reopened_history_survives() {
    // Given: A run recorded before the process exits
    let temp = tempfile::tempdir().expect("tempdir");
    let config = WarehouseConfig::under(temp.path());
    let run = run_record("nasdaq A-M", "2024-06-01T02:00:00Z");
    {
        let warehouse = Warehouse::open(config.clone()).expect("warehouse open");
        let store: &dyn RefreshStore = &warehouse;
        store.record_run(&run).await.expect("record run");
    }

    // When: The warehouse is opened again from the same home
    let reopened = Warehouse::open(config).expect("warehouse reopen");
    let store: &dyn RefreshStore = &reopened;

    // Then: The run is still there
    assert_eq!(store.run_history(10).await.expect("history"), vec![run]);
}

#[tokio::test]
async fn when_stored_run_is_unreadable_history_reports_corruption() {
    // Given: A run row whose id is not a UUID
    let (warehouse, _temp) = temp_warehouse();
    warehouse
        .record_run(&RunRow {
            run_id: String::from("not-a-uuid"),
            label: String::from("nasdaq A-M"),
            total_symbols: 1,
            processed: 1,
            failed: 0,
            success: true,
            duration_ms: 10,
            errors: Vec::new(),
            errors_truncated: 0,
            started_at: String::from("2024-06-01T02:00:00Z"),
            finished_at: String::from("2024-06-01T02:00:01Z"),
        })
        .expect("raw insert");

    // When: History is read through the store
    let store: &dyn RefreshStore = &warehouse;
    let error = store.run_history(5).await.expect_err("corrupt row");

    // Then: The problem is surfaced, not skipped
    assert!(matches!(error, StoreError::Corrupt(_)), "{error}");
}

#[test]
fn when_stock_row_has_unknown_source_it_is_rejected() {
    let mut row = stock_row("AAPL", "nasdaq", 190.0, "2024-06-04T20:00:00Z");
    row.source = String::from("yahoo");

    assert!(matches!(stock_record(row), Err(StoreError::Corrupt(_))));
}

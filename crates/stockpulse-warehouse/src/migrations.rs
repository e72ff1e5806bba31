use ::duckdb::{params, Connection};
use tracing::info;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_refresh_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS stocks (
    symbol TEXT PRIMARY KEY,
    universe TEXT NOT NULL,
    name TEXT NOT NULL,
    exchange TEXT,
    currency TEXT NOT NULL,
    sector TEXT,
    industry TEXT,
    country TEXT,
    price DOUBLE NOT NULL,
    change_percent DOUBLE,
    market_cap DOUBLE,
    pe_ratio DOUBLE,
    revenue_growth_pct DOUBLE,
    eps_growth_pct DOUBLE,
    week52_high DOUBLE,
    week52_low DOUBLE,
    source TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS refresh_runs (
    run_id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    total_symbols BIGINT NOT NULL,
    processed BIGINT NOT NULL,
    failed BIGINT NOT NULL,
    success BOOLEAN NOT NULL,
    duration_ms BIGINT NOT NULL,
    errors TEXT NOT NULL,
    errors_truncated BIGINT NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_stocks_universe ON stocks(universe);
CREATE INDEX IF NOT EXISTS idx_refresh_runs_started_at ON refresh_runs(started_at);
"#,
    },
];

/// Apply pending migrations in order, recording each in `schema_migrations`.
pub fn apply_migrations(connection: &Connection) -> Result<usize, ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        let already: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params![migration.version],
            |row| row.get(0),
        )?;
        if already > 0 {
            continue;
        }

        connection.execute_batch(migration.sql)?;
        connection.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            params![migration.version],
        )?;
        info!(version = migration.version, "applied warehouse migration");
        applied += 1;
    }

    Ok(applied)
}

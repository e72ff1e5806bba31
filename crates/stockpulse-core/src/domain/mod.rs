//! # Domain Models
//!
//! Canonical, validated types shared by the refresh pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker symbol |
//! | [`StockQuote`] | Latest price snapshot |
//! | [`GrowthMetrics`] | Revenue/EPS growth and valuation |
//! | [`CompanyProfile`] | Name, exchange, sector, market cap |
//! | [`StockRecord`] | Normalized row persisted per symbol |
//! | [`UtcDateTime`] | UTC wall-clock timestamp |
//!
//! Constructors validate their invariants and return [`crate::ValidationError`]
//! on bad input, so a value that exists is always well-formed.

mod models;
mod symbol;
mod timestamp;

pub use models::{
    validate_currency_code, CompanyProfile, GrowthMetrics, StockQuote, StockRecord,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;

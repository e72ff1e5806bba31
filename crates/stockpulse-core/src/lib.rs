//! # stockpulse Core
//!
//! Quota-aware batch refresh of stock fundamentals for a screener.
//!
//! ## Overview
//!
//! - **Rate limiting** per provider: a per-minute token bucket with an
//!   optional rolling daily cap
//! - **Universe partitioning** of fixed ticker lists by first letter
//! - **Refresh orchestration**: bounded worker pool, per-symbol error
//!   capture, run deadlines and run history
//! - **Provider adapters** for Finnhub (NASDAQ) and Financial Modeling Prep
//!   (Tel Aviv)
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Finnhub, FMP and offline mock sources |
//! | [`circuit_breaker`] | Per-provider circuit breaker |
//! | [`clock`] | Injectable monotonic clock |
//! | [`data_source`] | `MarketDataSource` trait and errors |
//! | [`domain`] | Symbols, quotes, growth, profiles, stock records |
//! | [`error`] | Validation errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider_policy`] | Free-tier quota and retry defaults |
//! | [`rate_limiter`] | Minute/day token bucket and registry |
//! | [`refresh`] | Batch orchestrator and run results |
//! | [`retry`] | Exponential backoff |
//! | [`settings`] | Environment configuration |
//! | [`source`] | Provider identifiers |
//! | [`store`] | Persistence seam for refresh runs |
//! | [`throttling`] | Per-second burst smoothing |
//! | [`universe`] | Ticker universes and letter ranges |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockpulse_core::{
//!     MemoryStore, MockSource, ProviderId, ProviderPolicy, RateLimiterRegistry,
//!     RefreshConfig, RefreshOrchestrator,
//! };
//!
//! let limiters = RateLimiterRegistry::default();
//! let orchestrator = RefreshOrchestrator::new(Arc::new(MemoryStore::new()), RefreshConfig::default())
//!     .with_builtin_universes()?
//!     .with_source(
//!         Arc::new(MockSource::new(ProviderId::Finnhub)),
//!         &ProviderPolicy::finnhub_default(),
//!         &limiters,
//!     )?;
//!
//! let result = orchestrator.refresh_stocks_in_range('A', 'M').await?;
//! println!("{} of {} refreshed", result.processed, result.total_symbols);
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables and never logged
//! - Logged URLs have key parameters masked

pub mod adapters;
pub mod circuit_breaker;
pub mod clock;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod provider_policy;
pub mod rate_limiter;
pub mod refresh;
pub mod retry;
pub mod settings;
pub mod source;
pub mod store;
pub mod throttling;
pub mod universe;

// Adapter implementations
pub use adapters::{FinnhubAdapter, FmpAdapter, MockSource};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Clock
pub use clock::{Clock, ManualClock, SystemClock};

// Data source trait and types
pub use data_source::{Endpoint, MarketDataSource, SourceError, SourceErrorKind, SourceFuture};

// Domain models
pub use domain::{
    validate_currency_code, CompanyProfile, GrowthMetrics, StockQuote, StockRecord, Symbol,
    UtcDateTime,
};

// Error types
pub use error::{CoreError, ValidationError};

// Warehouse (re-exported from stockpulse-warehouse)
pub use stockpulse_warehouse::{Warehouse, WarehouseConfig, WarehouseError};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, ScriptedHttpClient,
};

// Provider policies
pub use provider_policy::ProviderPolicy;

// Rate limiting
pub use rate_limiter::{
    RateLimitConfig, RateLimiter, RateLimiterRegistry, RateLimiterStatus, DAILY_WINDOW,
};

// Refresh orchestration
pub use refresh::{
    format_duration, FailureKind, RefreshConfig, RefreshError, RefreshOrchestrator,
    RefreshReport, RefreshResult, RunRecord, SymbolFailure,
};

// Retry logic
pub use retry::{Backoff, RetryPolicy};

// Settings
pub use settings::Settings;

// Source identifiers
pub use source::ProviderId;

// Storage
pub use store::{MemoryStore, RefreshStore, StoreError};

// Throttling
pub use throttling::{BurstThrottle, ThrottledHttpClient};

// Universes
pub use universe::{SymbolRange, Universe, UniverseName};

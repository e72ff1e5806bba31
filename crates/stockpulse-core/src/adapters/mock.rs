use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::data_source::{Endpoint, MarketDataSource, SourceError, SourceFuture};
use crate::{CompanyProfile, GrowthMetrics, ProviderId, StockQuote, Symbol, UtcDateTime};

#[derive(Debug, Clone)]
struct PlannedFailure {
    error: SourceError,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// Offline source with deterministic per-symbol data.
///
/// Backs `--mock` runs and orchestrator tests. Failures can be planned per
/// symbol and endpoint, either permanently or for the first `n` calls.
#[derive(Debug)]
pub struct MockSource {
    provider: ProviderId,
    latency: Duration,
    symbol_latency: HashMap<Symbol, Duration>,
    failures: Mutex<HashMap<(Symbol, Endpoint), PlannedFailure>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            latency: Duration::ZERO,
            symbol_latency: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulated network time per call, observed through `tokio::time`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Latency for `symbol` only, overriding [`Self::with_latency`].
    pub fn with_symbol_latency(mut self, symbol: &Symbol, latency: Duration) -> Self {
        self.symbol_latency.insert(symbol.clone(), latency);
        self
    }

    /// Every call for `symbol` on `endpoint` fails with `error`.
    pub fn failing(self, symbol: &Symbol, endpoint: Endpoint, error: SourceError) -> Self {
        self.plan(symbol, endpoint, error, None)
    }

    /// The first `times` calls for `symbol` on `endpoint` fail, later ones succeed.
    pub fn flaky(self, symbol: &Symbol, endpoint: Endpoint, times: u32, error: SourceError) -> Self {
        self.plan(symbol, endpoint, error, Some(times))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn plan(
        self,
        symbol: &Symbol,
        endpoint: Endpoint,
        error: SourceError,
        remaining: Option<u32>,
    ) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((symbol.clone(), endpoint), PlannedFailure { error, remaining });
        self
    }

    fn planned_failure(&self, symbol: &Symbol, endpoint: Endpoint) -> Option<SourceError> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let plan = failures.get_mut(&(symbol.clone(), endpoint))?;
        match plan.remaining.as_mut() {
            None => Some(plan.error.clone()),
            Some(0) => None,
            Some(remaining) => {
                *remaining -= 1;
                Some(plan.error.clone())
            }
        }
    }

    async fn call<T>(
        &self,
        symbol: &Symbol,
        endpoint: Endpoint,
        build: impl FnOnce(u64) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self
            .symbol_latency
            .get(symbol)
            .copied()
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.planned_failure(symbol, endpoint) {
            return Err(error);
        }
        build(symbol_seed(symbol))
    }
}

impl MarketDataSource for MockSource {
    fn id(&self) -> ProviderId {
        self.provider
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, StockQuote> {
        Box::pin(self.call(symbol, Endpoint::Quote, move |seed| {
            let price = 40.0 + (seed % 5_200) as f64 / 10.0;
            let previous_close = price * (1.0 - ((seed % 61) as f64 - 30.0) / 1_000.0);
            StockQuote::new(
                symbol.clone(),
                price,
                Some(price - previous_close),
                None,
                Some(previous_close),
                Some(price * 1.01),
                Some(price * 0.99),
                UtcDateTime::now(),
            )
            .map_err(|e| SourceError::internal(e.to_string()))
        }))
    }

    fn growth<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, GrowthMetrics> {
        Box::pin(self.call(symbol, Endpoint::Growth, move |seed| {
            GrowthMetrics::new(
                symbol.clone(),
                Some((seed % 800) as f64 / 10.0 - 20.0),
                Some((seed % 1_200) as f64 / 10.0 - 40.0),
                Some(8.0 + (seed % 420) as f64 / 10.0),
                None,
                None,
            )
            .map_err(|e| SourceError::internal(e.to_string()))
        }))
    }

    fn profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, CompanyProfile> {
        let currency = if symbol.exchange_suffix() == Some("TA") { "ILS" } else { "USD" };
        Box::pin(self.call(symbol, Endpoint::Profile, move |seed| {
            CompanyProfile::new(
                symbol.clone(),
                format!("{} Holdings", symbol.base()),
                Some(String::from(if currency == "ILS" { "TLV" } else { "NASDAQ" })),
                currency,
                Some(String::from("Technology")),
                None,
                None,
                Some(1_000_000_000.0 + (seed % 90_000) as f64 * 1_000_000.0),
            )
            .map_err(|e| SourceError::internal(e.to_string()))
        }))
    }
}

fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol
        .as_str()
        .bytes()
        .fold(17_u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(u64::from(byte)))
}

//! # Batch refresh
//!
//! A run takes a symbol list, fans it out to a bounded worker pool and folds
//! every per-symbol outcome into one [`RefreshResult`].
//!
//! Per symbol the worker makes three provider calls (quote, growth,
//! profile). Each call first checks the provider's circuit breaker, then
//! takes a permit from the provider's [`RateLimiter`], waiting for refill as
//! long as the symbol's wait budget allows. The merged [`StockRecord`] is
//! upserted into the [`RefreshStore`].
//!
//! Per-symbol problems never abort a run; they become entries in
//! `errors`. Only an unresolvable symbol set or a store that cannot record
//! the finished run surface as [`RefreshError`].

mod config;
mod failure;
mod result;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{Endpoint, MarketDataSource, SourceFuture};
use crate::provider_policy::ProviderPolicy;
use crate::rate_limiter::{RateLimiter, RateLimiterRegistry};
use crate::retry::RetryPolicy;
use crate::store::{RefreshStore, StoreError};
use crate::universe::{SymbolRange, Universe, UniverseName};
use crate::{ProviderId, StockRecord, Symbol, UtcDateTime, ValidationError};

pub use config::RefreshConfig;
pub use failure::{FailureKind, SymbolFailure};
pub use result::{format_duration, RefreshReport, RefreshResult, RunRecord};

/// Run-level failure. Per-symbol failures are reported inside
/// [`RefreshResult::errors`] instead.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cannot resolve symbols for '{label}': {reason}")]
    Universe { label: String, reason: String },

    #[error("refresh run '{}' could not be recorded: {source}", result.label)]
    Store {
        result: Box<RefreshResult>,
        source: StoreError,
    },
}

impl RefreshError {
    /// The finalized result, when the run itself completed.
    pub fn result(&self) -> Option<&RefreshResult> {
        match self {
            Self::Store { result, .. } => Some(result),
            Self::Validation(_) | Self::Universe { .. } => None,
        }
    }
}

#[derive(Clone)]
struct ProviderGate {
    source: Arc<dyn MarketDataSource>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

/// Drives refresh runs over the configured universes.
pub struct RefreshOrchestrator {
    store: Arc<dyn RefreshStore>,
    config: RefreshConfig,
    universes: HashMap<UniverseName, Universe>,
    gates: HashMap<ProviderId, ProviderGate>,
}

impl RefreshOrchestrator {
    pub fn new(store: Arc<dyn RefreshStore>, config: RefreshConfig) -> Self {
        Self {
            store,
            config,
            universes: HashMap::new(),
            gates: HashMap::new(),
        }
    }

    pub fn with_universe(mut self, name: UniverseName, universe: Universe) -> Self {
        self.universes.insert(name, universe);
        self
    }

    /// Load the bundled NASDAQ and Tel Aviv lists.
    pub fn with_builtin_universes(self) -> Result<Self, ValidationError> {
        Ok(self
            .with_universe(UniverseName::Nasdaq, Universe::nasdaq()?)
            .with_universe(UniverseName::Tlv, Universe::tlv()?))
    }

    /// Register `source` for its provider. The limiter comes from `limiters`
    /// so every orchestrator in the process shares one bucket per provider.
    pub fn with_source(
        mut self,
        source: Arc<dyn MarketDataSource>,
        policy: &ProviderPolicy,
        limiters: &RateLimiterRegistry,
    ) -> Result<Self, ValidationError> {
        let provider = source.id();
        let limiter = limiters.limiter(provider, policy.rate_limit())?;
        let gate = ProviderGate {
            source,
            limiter,
            breaker: Arc::new(CircuitBreaker::new(provider, policy.circuit)),
            retry: policy.retry,
        };
        self.gates.insert(provider, gate);
        Ok(self)
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RefreshStore> {
        &self.store
    }

    /// Refresh NASDAQ symbols whose first letter lies in `start..=end`.
    pub async fn refresh_stocks_in_range(
        &self,
        start: char,
        end: char,
    ) -> Result<RefreshResult, RefreshError> {
        self.refresh_range(SymbolRange::new(start, end)?).await
    }

    pub async fn refresh_range(&self, range: SymbolRange) -> Result<RefreshResult, RefreshError> {
        let label = format!("{} {range}", UniverseName::Nasdaq);
        let symbols = self.universe(UniverseName::Nasdaq, &label)?.partition(range);
        self.run(label, UniverseName::Nasdaq, symbols).await
    }

    /// Refresh the whole Tel Aviv universe.
    pub async fn refresh_tlv_stocks(&self) -> Result<RefreshResult, RefreshError> {
        let label = UniverseName::Tlv.to_string();
        let symbols = self.universe(UniverseName::Tlv, &label)?.symbols().to_vec();
        self.run(label, UniverseName::Tlv, symbols).await
    }

    /// `A-M` then `N-Z`. The second half starts only after the first is
    /// finalized and recorded.
    pub async fn refresh_all(&self) -> Result<Vec<RefreshResult>, RefreshError> {
        let halves = SymbolRange::full().split(2)?;
        let mut results = Vec::with_capacity(halves.len());
        for range in halves {
            results.push(self.refresh_range(range).await?);
        }
        Ok(results)
    }

    /// Refresh `symbols` against the provider serving `universe`.
    pub async fn run(
        &self,
        label: impl Into<String>,
        universe: UniverseName,
        symbols: Vec<Symbol>,
    ) -> Result<RefreshResult, RefreshError> {
        let label = label.into();
        let provider = universe.provider();
        let Some(gate) = self.gates.get(&provider).cloned() else {
            return Err(RefreshError::Universe {
                label,
                reason: format!("no market data source registered for {provider}"),
            });
        };

        let run_id = Uuid::new_v4();
        let started_at = UtcDateTime::now();
        let started = Instant::now();
        let total_symbols = symbols.len();
        info!(
            run_id = %run_id,
            label = %label,
            provider = %provider,
            total_symbols,
            concurrency = self.config.concurrency,
            "refresh run started"
        );

        let context = Arc::new(RunContext {
            gate,
            store: Arc::clone(&self.store),
            universe,
            soft_deadline: started + self.config.soft_deadline(),
            hard_deadline: started + self.config.run_budget,
            symbol_wait_budget: self.config.symbol_wait_budget,
        });
        let queue = Arc::new(Mutex::new(VecDeque::from(symbols)));
        let workers = self.config.concurrency.clamp(1, total_symbols.max(1));
        let (sender, mut receiver) = mpsc::channel(workers * 2);

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                tokio::spawn(drain_queue(
                    Arc::clone(&context),
                    Arc::clone(&queue),
                    sender.clone(),
                ))
            })
            .collect();
        drop(sender);

        let mut processed = 0;
        let mut failed = 0;
        let mut errors = Vec::new();
        while let Some(outcome) = receiver.recv().await {
            match outcome {
                Ok(symbol) => {
                    processed += 1;
                    debug!(run_id = %run_id, symbol = %symbol, "symbol refreshed");
                }
                Err(failure) => {
                    failed += 1;
                    warn!(
                        run_id = %run_id,
                        symbol = %failure.symbol(),
                        kind = %failure.kind(),
                        detail = failure.detail(),
                        "symbol refresh failed"
                    );
                    errors.push(failure.to_string());
                }
            }
        }

        for handle in handles {
            if let Err(join_error) = handle.await {
                error!(run_id = %run_id, error = %join_error, "refresh worker stopped");
            }
        }
        for symbol in take_all(&queue) {
            failed += 1;
            errors.push(
                SymbolFailure::new(&symbol, FailureKind::Abandoned, "no worker left to refresh it")
                    .to_string(),
            );
        }

        let elapsed = started.elapsed();
        let mut result = RefreshResult {
            run_id,
            label,
            total_symbols,
            processed,
            failed,
            duration: format_duration(elapsed),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            errors,
            success: true,
            started_at,
            finished_at: UtcDateTime::now(),
        };

        let record = RunRecord::from_result(&result, self.config.max_reported_errors);
        if let Err(source) = self.store.record_run(&record).await {
            error!(run_id = %run_id, error = %source, "failed to record refresh run");
            result.success = false;
            return Err(RefreshError::Store {
                result: Box::new(result),
                source,
            });
        }

        if result.failed > 0 {
            warn!(
                run_id = %run_id,
                label = %result.label,
                processed = result.processed,
                failed = result.failed,
                duration = %result.duration,
                "refresh run completed with failures"
            );
        } else {
            info!(
                run_id = %run_id,
                label = %result.label,
                processed = result.processed,
                duration = %result.duration,
                "refresh run completed"
            );
        }
        Ok(result)
    }

    fn universe(&self, name: UniverseName, label: &str) -> Result<&Universe, RefreshError> {
        self.universes
            .get(&name)
            .ok_or_else(|| RefreshError::Universe {
                label: label.to_owned(),
                reason: format!("universe {name} is not loaded"),
            })
    }
}

type SymbolOutcome = Result<Symbol, SymbolFailure>;

struct RunContext {
    gate: ProviderGate,
    store: Arc<dyn RefreshStore>,
    universe: UniverseName,
    soft_deadline: Instant,
    hard_deadline: Instant,
    symbol_wait_budget: std::time::Duration,
}

async fn drain_queue(
    context: Arc<RunContext>,
    queue: Arc<Mutex<VecDeque<Symbol>>>,
    results: mpsc::Sender<SymbolOutcome>,
) {
    loop {
        let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let Some(symbol) = next else {
            break;
        };

        let outcome = if Instant::now() >= context.soft_deadline {
            Err(SymbolFailure::skipped(&symbol))
        } else {
            settle(Arc::clone(&context), symbol).await
        };
        if results.send(outcome).await.is_err() {
            break;
        }
    }
}

/// Refresh one symbol on its own task so the hard deadline can abandon it.
async fn settle(context: Arc<RunContext>, symbol: Symbol) -> SymbolOutcome {
    let hard_deadline = context.hard_deadline;
    let task_symbol = symbol.clone();
    let mut task = tokio::spawn(async move {
        context.refresh_symbol(&task_symbol).await?;
        Ok(task_symbol)
    });

    match tokio::time::timeout_at(hard_deadline, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(SymbolFailure::new(
            &symbol,
            FailureKind::Abandoned,
            format!("refresh task failed: {join_error}"),
        )),
        Err(_) => {
            task.abort();
            Err(SymbolFailure::abandoned(&symbol))
        }
    }
}

fn take_all(queue: &Mutex<VecDeque<Symbol>>) -> Vec<Symbol> {
    queue.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect()
}

impl RunContext {
    async fn refresh_symbol(&self, symbol: &Symbol) -> Result<(), SymbolFailure> {
        let wait_until = (Instant::now() + self.symbol_wait_budget).min(self.hard_deadline);

        let quote = self
            .call(symbol, Endpoint::Quote, wait_until, |source, symbol| {
                source.quote(symbol)
            })
            .await?;
        let growth = self
            .call(symbol, Endpoint::Growth, wait_until, |source, symbol| {
                source.growth(symbol)
            })
            .await?;
        let profile = self
            .call(symbol, Endpoint::Profile, wait_until, |source, symbol| {
                source.profile(symbol)
            })
            .await?;

        let record = StockRecord::normalize(
            self.universe.as_str(),
            self.gate.source.id(),
            quote,
            growth,
            profile,
            UtcDateTime::now(),
        )
        .map_err(|e| SymbolFailure::new(symbol, FailureKind::Data, e.to_string()))?;

        self.store
            .upsert_stock(&record)
            .await
            .map_err(|e| SymbolFailure::new(symbol, FailureKind::Storage, e.to_string()))
    }

    /// One gated provider call with retries for transient errors.
    async fn call<T, F>(
        &self,
        symbol: &Symbol,
        endpoint: Endpoint,
        wait_until: Instant,
        invoke: F,
    ) -> Result<T, SymbolFailure>
    where
        F: for<'a> Fn(&'a dyn MarketDataSource, &'a Symbol) -> SourceFuture<'a, T>,
    {
        let gate = &self.gate;
        let mut retries = 0;
        loop {
            if !gate.breaker.allow_request() {
                return Err(SymbolFailure::circuit_open(symbol, endpoint, gate.source.id()));
            }
            if let Err(failure) = self.acquire_permit(symbol, endpoint, wait_until).await {
                gate.breaker.release_trial();
                return Err(failure);
            }

            let error = match invoke(gate.source.as_ref(), symbol).await {
                Ok(value) => {
                    gate.breaker.record_success();
                    return Ok(value);
                }
                Err(error) => error,
            };

            if error.is_provider_fault() {
                gate.breaker.record_failure();
            } else {
                gate.breaker.record_success();
            }

            let delay = if error.retryable() {
                gate.retry
                    .next_delay(retries)
                    .filter(|delay| Instant::now() + *delay < wait_until)
            } else {
                None
            };
            let Some(delay) = delay else {
                return Err(SymbolFailure::from_source(symbol, endpoint, &error));
            };

            retries += 1;
            debug!(
                symbol = %symbol,
                endpoint = %endpoint,
                retry = retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying provider call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Wait for a limiter permit, or fail once the next one would arrive
    /// after `wait_until`.
    async fn acquire_permit(
        &self,
        symbol: &Symbol,
        endpoint: Endpoint,
        wait_until: Instant,
    ) -> Result<(), SymbolFailure> {
        let limiter = &self.gate.limiter;
        loop {
            if limiter.consume_token() {
                return Ok(());
            }

            let Some(wait) = limiter.retry_after() else {
                tokio::task::yield_now().await;
                continue;
            };
            if Instant::now() + wait > wait_until {
                return Err(SymbolFailure::throttled(
                    symbol,
                    endpoint,
                    format!(
                        "{} limiter has no permit for another {}",
                        limiter.provider(),
                        format_duration(wait)
                    ),
                ));
            }

            debug!(
                symbol = %symbol,
                endpoint = %endpoint,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "waiting for rate limiter"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::adapters::MockSource;
    use crate::data_source::SourceError;
    use crate::store::MemoryStore;

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("symbol")
    }

    fn orchestrator(
        store: &MemoryStore,
        source: MockSource,
        policy: ProviderPolicy,
        config: RefreshConfig,
        symbols: &[&str],
    ) -> RefreshOrchestrator {
        let universe = Universe::from_symbols("nasdaq", symbols.iter().map(|value| symbol(value)));
        RefreshOrchestrator::new(Arc::new(store.clone()), config)
            .with_universe(UniverseName::Nasdaq, universe)
            .with_source(Arc::new(source), &policy, &RateLimiterRegistry::default())
            .expect("source registers")
    }

    #[tokio::test]
    async fn counts_successes_and_failures_in_range() {
        let store = MemoryStore::new();
        let source = MockSource::new(ProviderId::Finnhub).failing(
            &symbol("AXP"),
            Endpoint::Quote,
            SourceError::not_found("no quote for AXP"),
        );
        let orchestrator = orchestrator(
            &store,
            source,
            ProviderPolicy::finnhub_default(),
            RefreshConfig::default(),
            &["AAPL", "AMZN", "AXP", "MSFT"],
        );

        let result = orchestrator
            .refresh_stocks_in_range('A', 'A')
            .await
            .expect("run completes");

        assert_eq!(result.label, "nasdaq A-A");
        assert_eq!(
            (result.total_symbols, result.processed, result.failed),
            (3, 2, 1)
        );
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("AXP: data error: quote:"));
        assert!(result.success);
        assert!(store.stock(&symbol("AAPL")).is_some());
        assert!(store.stock(&symbol("MSFT")).is_none());
        assert_eq!(store.runs().len(), 1);
    }

    #[tokio::test]
    async fn empty_range_is_a_successful_no_op() {
        let store = MemoryStore::new();
        let orchestrator = orchestrator(
            &store,
            MockSource::new(ProviderId::Finnhub),
            ProviderPolicy::finnhub_default(),
            RefreshConfig::default(),
            &["MSFT"],
        );

        let result = orchestrator
            .refresh_stocks_in_range('A', 'A')
            .await
            .expect("run completes");

        assert_eq!(
            (result.total_symbols, result.processed, result.failed),
            (0, 0, 0)
        );
        assert!(result.errors.is_empty());
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_daily_quota_fails_remaining_symbols_as_rate_limited() {
        let store = MemoryStore::new();
        let mut policy = ProviderPolicy::finnhub_default();
        policy.requests_per_minute = 100;
        policy.requests_per_day = Some(3);
        let orchestrator = orchestrator(
            &store,
            MockSource::new(ProviderId::Finnhub),
            policy,
            RefreshConfig::default().with_concurrency(1),
            &["AAPL", "AMZN", "AXP"],
        );

        let result = orchestrator
            .refresh_stocks_in_range('A', 'A')
            .await
            .expect("run completes");

        assert_eq!((result.processed, result.failed), (1, 2));
        assert!(result
            .errors
            .iter()
            .all(|error| error.contains(": rate limited: ")));
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let store = MemoryStore::new();
        let source = MockSource::new(ProviderId::Finnhub).flaky(
            &symbol("AAPL"),
            Endpoint::Growth,
            1,
            SourceError::unavailable("upstream 503"),
        );
        let orchestrator = orchestrator(
            &store,
            source,
            ProviderPolicy::finnhub_default(),
            RefreshConfig::default(),
            &["AAPL"],
        );

        let result = orchestrator
            .refresh_stocks_in_range('A', 'Z')
            .await
            .expect("run completes");

        assert_eq!((result.processed, result.failed), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_skips_and_abandons_symbols() {
        let store = MemoryStore::new();
        let mut config = RefreshConfig::default().with_concurrency(1);
        config.run_budget = Duration::from_secs(10);
        config.deadline_margin = Duration::ZERO;
        let orchestrator = orchestrator(
            &store,
            MockSource::new(ProviderId::Finnhub).with_latency(Duration::from_secs(30)),
            ProviderPolicy::finnhub_default(),
            config,
            &["AAPL", "AMZN"],
        );

        let result = orchestrator
            .refresh_stocks_in_range('A', 'A')
            .await
            .expect("run completes");

        assert_eq!((result.processed, result.failed), (0, 2));
        assert_eq!(result.processed + result.failed, result.total_symbols);
        assert_eq!(
            result.errors,
            [
                "AAPL: abandoned: still in flight at run deadline",
                "AMZN: skipped: run deadline reached",
            ]
        );
    }

    #[tokio::test]
    async fn storage_failures_are_per_symbol() {
        let store = MemoryStore::new();
        store.reject_symbol(&symbol("AMZN"));
        let orchestrator = orchestrator(
            &store,
            MockSource::new(ProviderId::Finnhub),
            ProviderPolicy::finnhub_default(),
            RefreshConfig::default(),
            &["AAPL", "AMZN"],
        );

        let result = orchestrator
            .refresh_stocks_in_range('A', 'A')
            .await
            .expect("run completes");

        assert_eq!((result.processed, result.failed), (1, 1));
        assert!(result.errors[0].starts_with("AMZN: storage error:"));
    }

    #[tokio::test]
    async fn unrecorded_run_is_fatal() {
        let store = MemoryStore::new();
        store.reject_runs();
        let orchestrator = orchestrator(
            &store,
            MockSource::new(ProviderId::Finnhub),
            ProviderPolicy::finnhub_default(),
            RefreshConfig::default(),
            &["AAPL"],
        );

        let error = orchestrator
            .refresh_stocks_in_range('A', 'A')
            .await
            .expect_err("store failure is fatal");

        let result = error.result().expect("finalized result");
        assert!(!result.success);
        assert_eq!(result.processed, 1);
    }

    #[tokio::test]
    async fn missing_universe_is_fatal() {
        let store = MemoryStore::new();
        let orchestrator = orchestrator(
            &store,
            MockSource::new(ProviderId::Finnhub),
            ProviderPolicy::finnhub_default(),
            RefreshConfig::default(),
            &["AAPL"],
        );

        let error = orchestrator
            .refresh_tlv_stocks()
            .await
            .expect_err("tlv not loaded");
        assert!(matches!(error, RefreshError::Universe { .. }));
        assert!(store.runs().is_empty());
    }

    #[tokio::test]
    async fn refresh_all_runs_both_halves_in_order() {
        let store = MemoryStore::new();
        let orchestrator = orchestrator(
            &store,
            MockSource::new(ProviderId::Finnhub),
            ProviderPolicy::finnhub_default(),
            RefreshConfig::default(),
            &["AAPL", "NVDA", "ZS"],
        );

        let results = orchestrator.refresh_all().await.expect("both halves");

        let labels: Vec<&str> = results.iter().map(|result| result.label.as_str()).collect();
        assert_eq!(labels, ["nasdaq A-M", "nasdaq N-Z"]);
        assert_eq!(results[1].processed, 2);
        assert_eq!(store.runs().len(), 2);
    }
}

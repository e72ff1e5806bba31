//! Environment-driven settings.
//!
//! | Setting | Primary Env Var | Fallback Env Var |
//! |---------|-----------------|------------------|
//! | Data home | `STOCKPULSE_HOME` | `$HOME/.stockpulse` |
//! | Finnhub key | `STOCKPULSE_FINNHUB_API_KEY` | `FINNHUB_API_KEY` |
//! | FMP key | `STOCKPULSE_FMP_API_KEY` | `FMP_API_KEY` |
//! | Worker count | `STOCKPULSE_CONCURRENCY` | - |
//! | Run budget (seconds) | `STOCKPULSE_RUN_BUDGET_SECS` | - |

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{FinnhubAdapter, FmpAdapter, MockSource};
use crate::data_source::MarketDataSource;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::refresh::RefreshConfig;
use crate::throttling::{BurstThrottle, ThrottledHttpClient};
use crate::{ProviderId, ValidationError, WarehouseConfig};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub home: Option<PathBuf>,
    pub finnhub_api_key: Option<String>,
    pub fmp_api_key: Option<String>,
    pub concurrency: Option<usize>,
    pub run_budget: Option<Duration>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("home", &self.home)
            .field("finnhub_api_key", &self.finnhub_api_key.as_ref().map(|_| "***"))
            .field("fmp_api_key", &self.fmp_api_key.as_ref().map(|_| "***"))
            .field("concurrency", &self.concurrency)
            .field("run_budget", &self.run_budget)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let concurrency = read("STOCKPULSE_CONCURRENCY")
            .map(|value| match value.trim().parse::<usize>() {
                Ok(parsed) if parsed > 0 => Ok(parsed),
                _ => Err(ValidationError::InvalidSetting {
                    name: "STOCKPULSE_CONCURRENCY",
                    value,
                }),
            })
            .transpose()?;

        let run_budget = read("STOCKPULSE_RUN_BUDGET_SECS")
            .map(|value| match value.trim().parse::<u64>() {
                Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
                _ => Err(ValidationError::InvalidSetting {
                    name: "STOCKPULSE_RUN_BUDGET_SECS",
                    value,
                }),
            })
            .transpose()?;

        Ok(Self {
            home: read("STOCKPULSE_HOME").map(PathBuf::from),
            finnhub_api_key: read("STOCKPULSE_FINNHUB_API_KEY").or_else(|| read("FINNHUB_API_KEY")),
            fmp_api_key: read("STOCKPULSE_FMP_API_KEY").or_else(|| read("FMP_API_KEY")),
            concurrency,
            run_budget,
        })
    }

    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        match provider {
            ProviderId::Finnhub => self.finnhub_api_key.as_deref(),
            ProviderId::Fmp => self.fmp_api_key.as_deref(),
        }
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        let mut config = RefreshConfig::default();
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(run_budget) = self.run_budget {
            config = config.with_run_budget(run_budget);
        }
        config
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        match &self.home {
            Some(home) => WarehouseConfig::under(home),
            None => WarehouseConfig::default(),
        }
    }

    /// Live adapter for `provider`, paced by the policy's per-second burst.
    pub fn live_source(
        &self,
        policy: &ProviderPolicy,
    ) -> Result<Arc<dyn MarketDataSource>, ValidationError> {
        let provider = policy.provider_id;
        let api_key = self
            .api_key(provider)
            .ok_or(ValidationError::MissingApiKey {
                provider: provider.as_str(),
                variable: match provider {
                    ProviderId::Finnhub => "STOCKPULSE_FINNHUB_API_KEY",
                    ProviderId::Fmp => "STOCKPULSE_FMP_API_KEY",
                },
            })?;

        let transport: Arc<dyn HttpClient> = Arc::new(ThrottledHttpClient::new(
            Arc::new(ReqwestHttpClient::new()),
            BurstThrottle::per_second(policy.burst_per_second),
        ));

        Ok(match provider {
            ProviderId::Finnhub => Arc::new(
                FinnhubAdapter::new(transport, api_key).with_timeout(policy.request_timeout),
            ),
            ProviderId::Fmp => {
                Arc::new(FmpAdapter::new(transport, api_key).with_timeout(policy.request_timeout))
            }
        })
    }

    /// Offline source used by `--mock`.
    pub fn mock_source(&self, policy: &ProviderPolicy) -> Arc<dyn MarketDataSource> {
        Arc::new(MockSource::new(policy.provider_id))
    }
}

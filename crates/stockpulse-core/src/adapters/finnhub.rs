use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{fetch_json, non_empty, non_zero};
use crate::data_source::{Endpoint, MarketDataSource, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{CompanyProfile, GrowthMetrics, ProviderId, StockQuote, Symbol, UtcDateTime};

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Finnhub adapter for the US universe.
#[derive(Clone)]
pub struct FinnhubAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl FinnhubAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: String::from(DEFAULT_BASE_URL),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, path: &str, symbol: &Symbol) -> HttpRequest {
        HttpRequest::get(format!("{}{path}", self.base_url))
            .with_query("symbol", symbol.as_str())
            .with_header("X-Finnhub-Token", self.api_key.as_str())
            .with_timeout(self.timeout)
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<StockQuote, SourceError> {
        let request = self.request("/quote", symbol);
        let payload: FinnhubQuote = fetch_json(
            self.http_client.as_ref(),
            ProviderId::Finnhub,
            Endpoint::Quote,
            symbol,
            request,
        )
        .await?;

        // unknown tickers come back as an all-zero quote
        let price = match payload.current {
            Some(price) if price > 0.0 => price,
            _ => {
                return Err(SourceError::not_found(format!(
                    "finnhub has no quote for {symbol}"
                )))
            }
        };

        let as_of = payload
            .timestamp
            .filter(|seconds| *seconds > 0)
            .and_then(UtcDateTime::from_unix_seconds)
            .unwrap_or_else(UtcDateTime::now);

        StockQuote::new(
            symbol.clone(),
            price,
            payload.change,
            payload.change_percent,
            non_zero(payload.previous_close),
            non_zero(payload.high),
            non_zero(payload.low),
            as_of,
        )
        .map_err(|e| SourceError::invalid_response(e.to_string()))
    }

    async fn fetch_growth(&self, symbol: &Symbol) -> Result<GrowthMetrics, SourceError> {
        let request = self.request("/stock/metric", symbol).with_query("metric", "all");
        let payload: FinnhubMetricResponse = fetch_json(
            self.http_client.as_ref(),
            ProviderId::Finnhub,
            Endpoint::Growth,
            symbol,
            request,
        )
        .await?;

        let metric = payload.metric.ok_or_else(|| {
            SourceError::not_found(format!("finnhub has no metrics for {symbol}"))
        })?;

        GrowthMetrics::new(
            symbol.clone(),
            metric.revenue_growth_ttm_yoy,
            metric.eps_growth_ttm_yoy,
            metric.pe_ttm,
            metric.week52_high,
            metric.week52_low,
        )
        .map_err(|e| SourceError::invalid_response(e.to_string()))
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<CompanyProfile, SourceError> {
        let request = self.request("/stock/profile2", symbol);
        let payload: FinnhubProfile = fetch_json(
            self.http_client.as_ref(),
            ProviderId::Finnhub,
            Endpoint::Profile,
            symbol,
            request,
        )
        .await?;

        let name = non_empty(payload.name).ok_or_else(|| {
            SourceError::not_found(format!("finnhub has no profile for {symbol}"))
        })?;

        CompanyProfile::new(
            symbol.clone(),
            name,
            non_empty(payload.exchange),
            payload.currency.as_deref().unwrap_or("USD"),
            None,
            non_empty(payload.industry),
            non_empty(payload.country),
            // reported in millions
            non_zero(payload.market_capitalization).map(|millions| millions * 1_000_000.0),
        )
        .map_err(|e| SourceError::invalid_response(e.to_string()))
    }
}

impl MarketDataSource for FinnhubAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, StockQuote> {
        Box::pin(self.fetch_quote(symbol))
    }

    fn growth<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, GrowthMetrics> {
        Box::pin(self.fetch_growth(symbol))
    }

    fn profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, CompanyProfile> {
        Box::pin(self.fetch_profile(symbol))
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(rename = "c")]
    current: Option<f64>,
    #[serde(rename = "d")]
    change: Option<f64>,
    #[serde(rename = "dp")]
    change_percent: Option<f64>,
    #[serde(rename = "h")]
    high: Option<f64>,
    #[serde(rename = "l")]
    low: Option<f64>,
    #[serde(rename = "pc")]
    previous_close: Option<f64>,
    #[serde(rename = "t")]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubMetricResponse {
    metric: Option<FinnhubMetric>,
}

#[derive(Debug, Deserialize)]
struct FinnhubMetric {
    #[serde(rename = "revenueGrowthTTMYoy")]
    revenue_growth_ttm_yoy: Option<f64>,
    #[serde(rename = "epsGrowthTTMYoy")]
    eps_growth_ttm_yoy: Option<f64>,
    #[serde(rename = "peTTM")]
    pe_ttm: Option<f64>,
    #[serde(rename = "52WeekHigh")]
    week52_high: Option<f64>,
    #[serde(rename = "52WeekLow")]
    week52_low: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinnhubProfile {
    name: Option<String>,
    exchange: Option<String>,
    currency: Option<String>,
    country: Option<String>,
    #[serde(rename = "finnhubIndustry")]
    industry: Option<String>,
    market_capitalization: Option<f64>,
}

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{fetch_json, non_empty, non_zero};
use crate::data_source::{Endpoint, MarketDataSource, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{CompanyProfile, GrowthMetrics, ProviderId, StockQuote, Symbol, UtcDateTime};

const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

/// Financial Modeling Prep adapter, used for Tel Aviv (`.TA`) listings.
///
/// FMP answers every endpoint with a JSON array; an empty array means the
/// symbol is unknown.
#[derive(Clone)]
pub struct FmpAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl FmpAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: String::from(DEFAULT_BASE_URL),
            timeout: Duration::from_secs(8),
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
        HttpRequest::get(format!(
            "{}{path}/{}",
            self.base_url,
            urlencoding::encode(symbol.as_str())
        ))
        .with_query("apikey", self.api_key.as_str())
        .with_timeout(self.timeout)
    }

    async fn first<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        symbol: &Symbol,
        request: HttpRequest,
    ) -> Result<T, SourceError> {
        let rows: Vec<T> = fetch_json(
            self.http_client.as_ref(),
            ProviderId::Fmp,
            endpoint,
            symbol,
            request,
        )
        .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| SourceError::not_found(format!("fmp has no {endpoint} data for {symbol}")))
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<StockQuote, SourceError> {
        let row: FmpQuote = self
            .first(Endpoint::Quote, symbol, self.request("/quote", symbol))
            .await?;

        let price = row
            .price
            .filter(|price| *price > 0.0)
            .ok_or_else(|| SourceError::not_found(format!("fmp has no price for {symbol}")))?;

        let as_of = row
            .timestamp
            .and_then(UtcDateTime::from_unix_seconds)
            .unwrap_or_else(UtcDateTime::now);

        StockQuote::new(
            symbol.clone(),
            price,
            row.change,
            row.changes_percentage,
            non_zero(row.previous_close),
            non_zero(row.day_high),
            non_zero(row.day_low),
            as_of,
        )
        .map_err(|e| SourceError::invalid_response(e.to_string()))
    }

    async fn fetch_growth(&self, symbol: &Symbol) -> Result<GrowthMetrics, SourceError> {
        let request = self
            .request("/financial-growth", symbol)
            .with_query("period", "annual")
            .with_query("limit", "1");
        let row: FmpGrowth = self.first(Endpoint::Growth, symbol, request).await?;

        // FMP reports growth as a fraction
        GrowthMetrics::new(
            symbol.clone(),
            row.revenue_growth.map(|value| value * 100.0),
            row.eps_growth.map(|value| value * 100.0),
            None,
            None,
            None,
        )
        .map_err(|e| SourceError::invalid_response(e.to_string()))
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<CompanyProfile, SourceError> {
        let row: FmpProfile = self
            .first(Endpoint::Profile, symbol, self.request("/profile", symbol))
            .await?;

        let name = non_empty(row.company_name).unwrap_or_else(|| symbol.base().to_owned());

        CompanyProfile::new(
            symbol.clone(),
            name,
            non_empty(row.exchange_short_name),
            row.currency.as_deref().unwrap_or("ILS"),
            non_empty(row.sector),
            non_empty(row.industry),
            non_empty(row.country),
            non_zero(row.mkt_cap),
        )
        .map_err(|e| SourceError::invalid_response(e.to_string()))
    }
}

impl MarketDataSource for FmpAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Fmp
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
#[serde(rename_all = "camelCase")]
struct FmpQuote {
    price: Option<f64>,
    change: Option<f64>,
    changes_percentage: Option<f64>,
    previous_close: Option<f64>,
    day_high: Option<f64>,
    day_low: Option<f64>,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FmpGrowth {
    #[serde(rename = "revenueGrowth")]
    revenue_growth: Option<f64>,
    #[serde(rename = "epsgrowth")]
    eps_growth: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpProfile {
    company_name: Option<String>,
    currency: Option<String>,
    exchange_short_name: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    country: Option<String>,
    mkt_cap: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::ScriptedHttpClient;

    fn teva() -> Symbol {
        Symbol::parse("TEVA.TA").expect("valid symbol")
    }

    fn adapter(client: ScriptedHttpClient) -> FmpAdapter {
        FmpAdapter::new(Arc::new(client), "test-key").with_base_url("https://fmp.test/api/v3")
    }

    #[tokio::test]
    async fn parses_array_payloads() {
        let client = ScriptedHttpClient::new()
            .respond(
                "/quote",
                "TEVA.TA",
                r#"[{"symbol":"TEVA.TA","price":5620.0,"changesPercentage":1.2,"change":66.0,"dayLow":5500.0,"dayHigh":5650.0,"previousClose":5554.0,"timestamp":1717430400}]"#,
            )
            .respond(
                "/financial-growth",
                "TEVA.TA",
                r#"[{"symbol":"TEVA.TA","revenueGrowth":0.041,"epsgrowth":-0.25}]"#,
            )
            .respond(
                "/profile",
                "TEVA.TA",
                r#"[{"companyName":"Teva Pharmaceutical Industries","currency":"ILS","exchangeShortName":"TLV","sector":"Healthcare","industry":"Drug Manufacturers","country":"IL","mktCap":63000000000}]"#,
            );
        let adapter = adapter(client);

        let quote = adapter.quote(&teva()).await.expect("quote");
        let growth = adapter.growth(&teva()).await.expect("growth");
        let profile = adapter.profile(&teva()).await.expect("profile");

        assert_eq!(quote.price, 5620.0);
        let revenue = growth.revenue_growth_pct.expect("revenue growth");
        assert!((revenue - 4.1).abs() < 1e-9);
        assert_eq!(profile.currency, "ILS");
        assert_eq!(profile.sector.as_deref(), Some("Healthcare"));
    }

    #[tokio::test]
    async fn empty_array_is_not_found() {
        let client = ScriptedHttpClient::new().respond("/quote", "TEVA.TA", "[]");
        let err = adapter(client).quote(&teva()).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::NotFound);
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let client = ScriptedHttpClient::new().respond_status("/profile", "TEVA.TA", 503);
        let err = adapter(client).profile(&teva()).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::Unavailable);
        assert!(err.retryable());
    }
}

//! Provider adapters.
//!
//! Each adapter turns one [`crate::MarketDataSource`] call into a single HTTP
//! request and normalizes the provider payload into the domain types.

mod finnhub;
mod fmp;
mod mock;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::data_source::{Endpoint, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{ProviderId, Symbol};

pub use finnhub::FinnhubAdapter;
pub use fmp::FmpAdapter;
pub use mock::MockSource;

/// Send `request` and decode a JSON body, mapping HTTP outcomes to [`SourceError`].
///
/// 429 is an upstream rate limit, 5xx and transport failures mean the provider
/// is unavailable; both are retryable. 401/403 is a credential problem and 404
/// means the provider does not know the symbol.
async fn fetch_json<T: DeserializeOwned>(
    client: &dyn HttpClient,
    provider: ProviderId,
    endpoint: Endpoint,
    symbol: &Symbol,
    request: HttpRequest,
) -> Result<T, SourceError> {
    let url = request.redacted_url();
    let response = client.execute(request).await.map_err(|e| {
        SourceError::unavailable(format!("{provider} {endpoint} transport error: {}", e.message()))
    })?;

    debug!(%provider, %endpoint, %symbol, status = response.status, url = %url, "provider response");

    match response.status {
        200..=299 => {}
        429 => {
            return Err(SourceError::rate_limited(format!(
                "{provider} rejected {endpoint} with 429"
            )))
        }
        401 | 403 => {
            return Err(SourceError::unauthorized(format!(
                "{provider} rejected credentials ({})",
                response.status
            )))
        }
        404 => {
            return Err(SourceError::not_found(format!(
                "{provider} has no {endpoint} data for {symbol}"
            )))
        }
        status if status >= 500 => {
            return Err(SourceError::unavailable(format!(
                "{provider} returned status {status}"
            )))
        }
        status => {
            return Err(SourceError::invalid_response(format!(
                "{provider} returned unexpected status {status}"
            )))
        }
    }

    if response.body.trim().is_empty() {
        return Err(SourceError::not_found(format!(
            "{provider} returned an empty {endpoint} body for {symbol}"
        )));
    }

    serde_json::from_str(&response.body).map_err(|e| {
        SourceError::invalid_response(format!("failed to parse {provider} {endpoint} payload: {e}"))
    })
}

/// Treat zero as "not reported"; providers use it as a placeholder.
fn non_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|value| *value != 0.0 && value.is_finite())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

use serde::{Deserialize, Serialize};

use crate::{ProviderId, Symbol, UtcDateTime, ValidationError};

/// Latest trade snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: Symbol,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub previous_close: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub as_of: UtcDateTime,
}

impl StockQuote {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        price: f64,
        change: Option<f64>,
        change_percent: Option<f64>,
        previous_close: Option<f64>,
        day_high: Option<f64>,
        day_low: Option<f64>,
        as_of: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;
        validate_optional_finite("change", change)?;
        validate_optional_finite("change_percent", change_percent)?;
        validate_optional_non_negative("previous_close", previous_close)?;
        validate_optional_non_negative("day_high", day_high)?;
        validate_optional_non_negative("day_low", day_low)?;

        Ok(Self {
            symbol,
            price,
            change,
            change_percent,
            previous_close,
            day_high,
            day_low,
            as_of,
        })
    }
}

/// Growth and valuation metrics used by the screener filters.
///
/// Percentages are expressed in percent units (12.5 means +12.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthMetrics {
    pub symbol: Symbol,
    pub revenue_growth_pct: Option<f64>,
    pub eps_growth_pct: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub week52_high: Option<f64>,
    pub week52_low: Option<f64>,
}

impl GrowthMetrics {
    pub fn new(
        symbol: Symbol,
        revenue_growth_pct: Option<f64>,
        eps_growth_pct: Option<f64>,
        pe_ratio: Option<f64>,
        week52_high: Option<f64>,
        week52_low: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validate_optional_finite("revenue_growth_pct", revenue_growth_pct)?;
        validate_optional_finite("eps_growth_pct", eps_growth_pct)?;
        validate_optional_finite("pe_ratio", pe_ratio)?;
        validate_optional_non_negative("week52_high", week52_high)?;
        validate_optional_non_negative("week52_low", week52_low)?;

        Ok(Self {
            symbol,
            revenue_growth_pct,
            eps_growth_pct,
            pe_ratio,
            week52_high,
            week52_low,
        })
    }
}

/// Company descriptive data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: Symbol,
    pub name: String,
    pub exchange: Option<String>,
    pub currency: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub market_cap: Option<f64>,
}

impl CompanyProfile {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        exchange: Option<String>,
        currency: impl AsRef<str>,
        sector: Option<String>,
        industry: Option<String>,
        country: Option<String>,
        market_cap: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validate_optional_non_negative("market_cap", market_cap)?;

        Ok(Self {
            symbol,
            name: name.into(),
            exchange: non_blank(exchange),
            currency: validate_currency_code(currency.as_ref())?,
            sector: non_blank(sector),
            industry: non_blank(industry),
            country: non_blank(country),
            market_cap,
        })
    }
}

/// The normalized per-symbol row a refresh run hands to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: Symbol,
    pub universe: String,
    pub name: String,
    pub exchange: Option<String>,
    pub currency: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub price: f64,
    pub change_percent: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub revenue_growth_pct: Option<f64>,
    pub eps_growth_pct: Option<f64>,
    pub week52_high: Option<f64>,
    pub week52_low: Option<f64>,
    pub source: ProviderId,
    pub updated_at: UtcDateTime,
}

impl StockRecord {
    /// Merge the three provider payloads for one symbol.
    ///
    /// All payloads must describe the same symbol.
    pub fn normalize(
        universe: impl Into<String>,
        source: ProviderId,
        quote: StockQuote,
        growth: GrowthMetrics,
        profile: CompanyProfile,
        updated_at: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        for found in [&growth.symbol, &profile.symbol] {
            if *found != quote.symbol {
                return Err(ValidationError::SymbolMismatch {
                    expected: quote.symbol.to_string(),
                    found: found.to_string(),
                });
            }
        }

        let name = if profile.name.trim().is_empty() {
            quote.symbol.to_string()
        } else {
            profile.name.trim().to_owned()
        };

        let change_percent = quote.change_percent.or_else(|| {
            let previous = quote.previous_close.filter(|value| *value > 0.0)?;
            Some((quote.price - previous) / previous * 100.0)
        });

        Ok(Self {
            symbol: quote.symbol,
            universe: universe.into(),
            name,
            exchange: profile.exchange,
            currency: profile.currency,
            sector: profile.sector,
            industry: profile.industry,
            country: profile.country,
            price: quote.price,
            change_percent,
            market_cap: profile.market_cap,
            pe_ratio: growth.pe_ratio,
            revenue_growth_pct: growth.revenue_growth_pct,
            eps_growth_pct: growth.eps_growth_pct,
            week52_high: growth.week52_high,
            week52_low: growth.week52_low,
            source,
            updated_at,
        })
    }
}

/// Validate and normalize currency to uppercase 3-letter code.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn validate_optional_non_negative(
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if let Some(value) = value {
        validate_non_negative(field, value)?;
    }
    Ok(())
}

fn validate_optional_finite(
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if let Some(value) = value {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field });
        }
    }
    Ok(())
}

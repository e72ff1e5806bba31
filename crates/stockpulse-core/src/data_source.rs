//! Market-data source contract.
//!
//! A refresh needs three calls per symbol:
//!
//! | Endpoint | Method | Response |
//! |----------|--------|----------|
//! | Quote | [`MarketDataSource::quote`] | [`StockQuote`] |
//! | Growth | [`MarketDataSource::growth`] | [`GrowthMetrics`] |
//! | Profile | [`MarketDataSource::profile`] | [`CompanyProfile`] |
//!
//! Each call costs one request against the provider's quota, so callers gate
//! every call through the provider's [`crate::RateLimiter`].

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{CompanyProfile, GrowthMetrics, ProviderId, StockQuote, Symbol};

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Quote,
    Growth,
    Profile,
}

impl Endpoint {
    pub const ALL: [Self; 3] = [Self::Quote, Self::Growth, Self::Profile];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Growth => "growth",
            Self::Profile => "profile",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    Unauthorized,
    NotFound,
    InvalidResponse,
    Internal,
}

/// Structured provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message, true)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unauthorized, message, false)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound, message, false)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidResponse, message, false)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Internal, message, false)
    }

    fn new(kind: SourceErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Whether this error says something about the provider's health rather
    /// than about one symbol's data.
    pub const fn is_provider_fault(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Unavailable | SourceErrorKind::RateLimited
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Unauthorized => "source.unauthorized",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::InvalidResponse => "source.invalid_response",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Provider adapter contract.
///
/// Implementations perform exactly one upstream request per call and leave
/// quota accounting, retries and circuit breaking to the caller.
pub trait MarketDataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, StockQuote>;

    fn growth<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, GrowthMetrics>;

    fn profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, CompanyProfile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_match_provider_faults() {
        assert!(SourceError::rate_limited("429").retryable());
        assert!(SourceError::unavailable("503").is_provider_fault());
        assert!(!SourceError::not_found("gone").retryable());
        assert!(!SourceError::invalid_response("bad").is_provider_fault());
    }

    #[test]
    fn display_includes_stable_code() {
        let err = SourceError::not_found("no quote for ZZZZ");
        assert_eq!(err.to_string(), "no quote for ZZZZ (source.not_found)");
    }
}

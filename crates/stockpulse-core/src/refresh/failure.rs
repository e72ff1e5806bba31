use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::data_source::{Endpoint, SourceError, SourceErrorKind};
use crate::Symbol;

/// Why one symbol did not make it into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No limiter permit within the symbol's wait budget.
    Throttled,
    /// Provider circuit is open.
    Unavailable,
    /// Upstream transport, status or credential error.
    Provider,
    /// Payload missing, malformed or inconsistent.
    Data,
    Storage,
    /// Not started before the run deadline.
    Skipped,
    /// Still in flight at the hard deadline.
    Abandoned,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Throttled => "rate limited",
            Self::Unavailable => "unavailable",
            Self::Provider => "provider error",
            Self::Data => "data error",
            Self::Storage => "storage error",
            Self::Skipped => "skipped",
            Self::Abandoned => "abandoned",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-symbol failure, rendered as `"<SYMBOL>: <kind>: <detail>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFailure {
    symbol: Symbol,
    kind: FailureKind,
    detail: String,
}

impl SymbolFailure {
    pub fn new(symbol: &Symbol, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            symbol: symbol.clone(),
            kind,
            detail: detail.into(),
        }
    }

    pub fn throttled(symbol: &Symbol, endpoint: Endpoint, detail: impl Display) -> Self {
        Self::new(symbol, FailureKind::Throttled, format!("{endpoint}: {detail}"))
    }

    pub fn circuit_open(symbol: &Symbol, endpoint: Endpoint, provider: impl Display) -> Self {
        Self::new(
            symbol,
            FailureKind::Unavailable,
            format!("{endpoint}: {provider} circuit is open"),
        )
    }

    pub fn skipped(symbol: &Symbol) -> Self {
        Self::new(symbol, FailureKind::Skipped, "run deadline reached")
    }

    pub fn abandoned(symbol: &Symbol) -> Self {
        Self::new(symbol, FailureKind::Abandoned, "still in flight at run deadline")
    }

    /// Classify a provider error: missing or unusable payloads are data
    /// errors, everything else is attributed to the provider.
    pub fn from_source(symbol: &Symbol, endpoint: Endpoint, error: &SourceError) -> Self {
        let kind = match error.kind() {
            SourceErrorKind::NotFound | SourceErrorKind::InvalidResponse => FailureKind::Data,
            SourceErrorKind::Unavailable
            | SourceErrorKind::RateLimited
            | SourceErrorKind::Unauthorized
            | SourceErrorKind::Internal => FailureKind::Provider,
        };
        Self::new(symbol, kind, format!("{endpoint}: {error}"))
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl Display for SymbolFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.symbol, self.kind, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axp() -> Symbol {
        Symbol::parse("AXP").expect("symbol")
    }

    #[test]
    fn renders_symbol_qualified_message() {
        let failure = SymbolFailure::skipped(&axp());
        assert_eq!(failure.to_string(), "AXP: skipped: run deadline reached");
    }

    #[test]
    fn throttled_failures_are_distinguishable() {
        let failure = SymbolFailure::throttled(&axp(), Endpoint::Quote, "no permit within 65s");
        assert!(failure.to_string().starts_with("AXP: rate limited: quote:"));
    }

    #[test]
    fn classifies_source_errors() {
        let missing = SymbolFailure::from_source(
            &axp(),
            Endpoint::Profile,
            &SourceError::not_found("no profile"),
        );
        let upstream = SymbolFailure::from_source(
            &axp(),
            Endpoint::Quote,
            &SourceError::unavailable("finnhub returned status 503"),
        );

        assert_eq!(missing.kind(), FailureKind::Data);
        assert_eq!(upstream.kind(), FailureKind::Provider);
        assert_eq!(
            upstream.to_string(),
            "AXP: provider error: quote: finnhub returned status 503 (source.unavailable)"
        );
    }
}

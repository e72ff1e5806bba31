use thiserror::Error;

/// Validation and contract errors exposed by `stockpulse-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("range bound must be an ASCII letter: '{ch}'")]
    InvalidRangeLetter { ch: char },
    #[error("range start '{start}' is after range end '{end}'")]
    InvertedRange { start: char, end: char },
    #[error("range must look like 'A-M', got '{value}'")]
    MalformedRange { value: String },
    #[error("range cannot be split into {parts} parts")]
    InvalidSplit { parts: usize },

    #[error("unknown universe '{value}', expected one of nasdaq, tlv")]
    UnknownUniverse { value: String },
    #[error("universe '{name}' line {line}: {reason}")]
    InvalidUniverseEntry {
        name: String,
        line: usize,
        reason: String,
    },

    #[error("invalid provider '{value}', expected one of finnhub, fmp")]
    InvalidProvider { value: String },
    #[error("requests_per_minute must be greater than zero")]
    ZeroRequestsPerMinute,
    #[error("requests_per_day must be greater than zero when set")]
    ZeroRequestsPerDay,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("payload for '{found}' does not match requested symbol '{expected}'")]
    SymbolMismatch { expected: String, found: String },

    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidSetting { name: &'static str, value: String },
    #[error("no API key for {provider}; set {variable}")]
    MissingApiKey {
        provider: &'static str,
        variable: &'static str,
    },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

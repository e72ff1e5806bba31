use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical identifiers of the market-data providers the refresh pipeline talks to.
///
/// The id is also the partition key for rate-limiter state: two providers never
/// share a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Finnhub,
    Fmp,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::Finnhub, Self::Fmp];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finnhub => "finnhub",
            Self::Fmp => "fmp",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "finnhub" => Ok(Self::Finnhub),
            "fmp" => Ok(Self::Fmp),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(" FinnHub ".parse::<ProviderId>(), Ok(ProviderId::Finnhub));
        assert!(matches!(
            "yahoo".parse::<ProviderId>(),
            Err(ValidationError::InvalidProvider { .. })
        ));
    }
}

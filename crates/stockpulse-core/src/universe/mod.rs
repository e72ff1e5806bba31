//! Fixed ticker universes and the alphabetic partitioner over them.

mod range;

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ProviderId, Symbol, ValidationError};

pub use range::SymbolRange;

const NASDAQ_LIST: &str = include_str!("../../data/nasdaq.txt");
const TLV_LIST: &str = include_str!("../../data/tlv.txt");

/// Built-in universes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniverseName {
    Nasdaq,
    Tlv,
}

impl UniverseName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nasdaq => "nasdaq",
            Self::Tlv => "tlv",
        }
    }

    /// Provider that serves quotes for this universe.
    pub const fn provider(self) -> ProviderId {
        match self {
            Self::Nasdaq => ProviderId::Finnhub,
            Self::Tlv => ProviderId::Fmp,
        }
    }
}

impl Display for UniverseName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UniverseName {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nasdaq" | "us" => Ok(Self::Nasdaq),
            "tlv" | "tase" => Ok(Self::Tlv),
            _ => Err(ValidationError::UnknownUniverse {
                value: value.to_owned(),
            }),
        }
    }
}

/// Ordered, duplicate-free ticker list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    name: String,
    symbols: Vec<Symbol>,
}

impl Universe {
    pub fn nasdaq() -> Result<Self, ValidationError> {
        Self::from_lines(UniverseName::Nasdaq.as_str(), NASDAQ_LIST)
    }

    pub fn tlv() -> Result<Self, ValidationError> {
        Self::from_lines(UniverseName::Tlv.as_str(), TLV_LIST)
    }

    pub fn builtin(name: UniverseName) -> Result<Self, ValidationError> {
        match name {
            UniverseName::Nasdaq => Self::nasdaq(),
            UniverseName::Tlv => Self::tlv(),
        }
    }

    /// Parse one symbol per line. Blank lines and `#` comments are skipped;
    /// repeated symbols keep their first position.
    pub fn from_lines(name: impl Into<String>, text: &str) -> Result<Self, ValidationError> {
        let name = name.into();
        let mut symbols = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let entry = line.split('#').next().unwrap_or_default().trim();
            if entry.is_empty() {
                continue;
            }
            let symbol =
                Symbol::parse(entry).map_err(|err| ValidationError::InvalidUniverseEntry {
                    name: name.clone(),
                    line: index + 1,
                    reason: err.to_string(),
                })?;
            symbols.push(symbol);
        }

        Ok(Self::from_symbols(name, symbols))
    }

    pub fn from_symbols(name: impl Into<String>, symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            name: name.into(),
            symbols: dedup_in_order(symbols),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols whose first letter falls in `range`, in universe order.
    pub fn partition(&self, range: SymbolRange) -> Vec<Symbol> {
        self.symbols
            .iter()
            .filter(|symbol| range.contains(symbol))
            .cloned()
            .collect()
    }
}

fn dedup_in_order(symbols: impl IntoIterator<Item = Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lists_parse() {
        let nasdaq = Universe::nasdaq().expect("nasdaq list");
        let tlv = Universe::tlv().expect("tlv list");

        assert!(nasdaq.len() > 100);
        assert!(tlv
            .symbols()
            .iter()
            .all(|symbol| symbol.exchange_suffix() == Some("TA")));
    }

    #[test]
    fn from_lines_skips_comments_and_duplicates() {
        let universe = Universe::from_lines(
            "custom",
            "# header\nAXP\n\namzn  # inline\nAAPL\nAXP\n",
        )
        .expect("list");

        let listed: Vec<&str> = universe.symbols().iter().map(Symbol::as_str).collect();
        assert_eq!(listed, ["AXP", "AMZN", "AAPL"]);
    }

    #[test]
    fn from_lines_reports_bad_line_number() {
        let err = Universe::from_lines("custom", "AAPL\n$BAD\n").expect_err("must fail");
        assert!(matches!(
            err,
            ValidationError::InvalidUniverseEntry { line: 2, .. }
        ));
    }

    #[test]
    fn partition_is_ordered_and_deterministic() {
        let universe = Universe::from_lines("custom", "MSFT\nAAPL\nNVDA\nAMZN\nAXP\nZM").expect("list");
        let range = SymbolRange::new('a', 'a').expect("range");

        let first = universe.partition(range);
        let second = universe.partition(range);
        let listed: Vec<&str> = first.iter().map(Symbol::as_str).collect();

        assert_eq!(listed, ["AAPL", "AMZN", "AXP"]);
        assert_eq!(first, second);
    }

    #[test]
    fn split_halves_cover_the_universe() {
        let universe = Universe::nasdaq().expect("nasdaq list");
        let total: usize = SymbolRange::full()
            .split(2)
            .expect("split")
            .into_iter()
            .map(|range| universe.partition(range).len())
            .sum();
        assert_eq!(total, universe.len());
    }

    #[test]
    fn parses_universe_names() {
        assert_eq!("TLV".parse::<UniverseName>(), Ok(UniverseName::Tlv));
        assert_eq!(UniverseName::Tlv.provider(), ProviderId::Fmp);
        assert!("lse".parse::<UniverseName>().is_err());
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Symbol, ValidationError};

/// Closed alphabetic interval over the first letter of a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRange {
    start: char,
    end: char,
}

impl SymbolRange {
    pub fn new(start: char, end: char) -> Result<Self, ValidationError> {
        let start = normalize_letter(start)?;
        let end = normalize_letter(end)?;
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn full() -> Self {
        Self {
            start: 'A',
            end: 'Z',
        }
    }

    /// Accepts `A-M`, `a-m` or a single letter `Q`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedRange {
            value: input.to_owned(),
        };

        let trimmed = input.trim();
        let (start, end) = match trimmed.split_once('-') {
            Some((start, end)) => (single_char(start.trim()), single_char(end.trim())),
            None => (single_char(trimmed), single_char(trimmed)),
        };

        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(malformed()),
        }
    }

    pub fn start(self) -> char {
        self.start
    }

    pub fn end(self) -> char {
        self.end
    }

    pub fn letter_count(self) -> usize {
        (self.end as u8 - self.start as u8) as usize + 1
    }

    pub fn contains(self, symbol: &Symbol) -> bool {
        let first = symbol.first_letter().to_ascii_uppercase();
        (self.start..=self.end).contains(&first)
    }

    /// Split into `parts` contiguous, disjoint ranges covering `self`.
    ///
    /// Earlier parts take the extra letter when the count does not divide evenly.
    pub fn split(self, parts: usize) -> Result<Vec<Self>, ValidationError> {
        let letters = self.letter_count();
        if parts == 0 || parts > letters {
            return Err(ValidationError::InvalidSplit { parts });
        }

        let base = letters / parts;
        let extra = letters % parts;
        let mut next = self.start as u8;
        let mut ranges = Vec::with_capacity(parts);

        for index in 0..parts {
            let width = base + usize::from(index < extra);
            let end = next + width as u8 - 1;
            ranges.push(Self {
                start: next as char,
                end: end as char,
            });
            next = end + 1;
        }

        Ok(ranges)
    }
}

impl Default for SymbolRange {
    fn default() -> Self {
        Self::full()
    }
}

impl Display for SymbolRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for SymbolRange {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

fn normalize_letter(ch: char) -> Result<char, ValidationError> {
    if ch.is_ascii_alphabetic() {
        Ok(ch.to_ascii_uppercase())
    } else {
        Err(ValidationError::InvalidRangeLetter { ch })
    }
}

fn single_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    let ch = chars.next()?;
    chars.next().is_none().then_some(ch)
}

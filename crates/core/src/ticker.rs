//! Ticker symbols.

use crate::ConfigError;
use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Exchange-qualified security symbol (e.g. "AAPL", "2330.TW", "^TWII").
///
/// Always upper-case and non-empty. Whether the provider knows the symbol is
/// not checked here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ticker(CompactString);

impl Ticker {
    /// Longest symbol accepted.
    pub const MAX_LEN: usize = 32;

    /// Parse and normalize a user-supplied symbol.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidTicker(raw.to_string(), "empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(ConfigError::InvalidTicker(raw.to_string(), "too long"));
        }
        if !trimmed.chars().all(is_symbol_char) {
            return Err(ConfigError::InvalidTicker(
                raw.to_string(),
                "unsupported character",
            ));
        }
        Ok(Self(CompactString::new(trimmed.to_ascii_uppercase())))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[inline]
fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=' | '_')
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::str::FromStr for Ticker {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Ticker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

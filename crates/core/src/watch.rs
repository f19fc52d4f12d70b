//! Watchlist entries.

use crate::{ConfigError, Ticker};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A ticker together with the price at or above which to notify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub ticker: Ticker,
    pub target_price: Decimal,
}

impl WatchEntry {
    /// Build an entry from raw user input.
    pub fn new(ticker: &str, target_price: Decimal) -> Result<Self, ConfigError> {
        let ticker = Ticker::parse(ticker)?;
        check_target(&ticker, target_price)?;
        Ok(Self {
            ticker,
            target_price,
        })
    }

    /// Re-check an entry that may have been deserialized or built by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_target(&self.ticker, self.target_price)
    }
}

/// Targets must be non-negative.
pub fn check_target(ticker: &Ticker, target_price: Decimal) -> Result<(), ConfigError> {
    if target_price.is_sign_negative() && !target_price.is_zero() {
        return Err(ConfigError::InvalidTarget {
            ticker: ticker.to_string(),
            target: target_price,
        });
    }
    Ok(())
}

/// Validate a whole watchlist before a monitoring session uses it.
///
/// Rejects empty lists, negative targets and repeated tickers.
pub fn validate_watchlist(entries: &[WatchEntry]) -> Result<(), ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::EmptyWatchlist);
    }
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        entry.validate()?;
        if !seen.insert(&entry.ticker) {
            return Err(ConfigError::DuplicateTicker(entry.ticker.to_string()));
        }
    }
    Ok(())
}

//! Error types shared across the workspace.

use rust_decimal::Decimal;
use thiserror::Error;

/// Invalid watchlist or entry supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Watchlist is empty")]
    EmptyWatchlist,

    #[error("Invalid ticker {0:?}: {1}")]
    InvalidTicker(String, &'static str),

    #[error("Invalid target price for {ticker}: {target}")]
    InvalidTarget { ticker: String, target: Decimal },

    #[error("Ticker {0} appears more than once in the watchlist")]
    DuplicateTicker(String),
}

/// Failure of a watchlist store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Corrupt watchlist row: {0}")]
    Corrupt(String),
}

//! Price quotes.

use crate::Ticker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Most recent traded price for a ticker, as reported by a price source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub ticker: Ticker,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(ticker: Ticker, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            ticker,
            price,
            timestamp,
        }
    }

    /// Quote stamped with the current time.
    pub fn now(ticker: Ticker, price: Decimal) -> Self {
        Self::new(ticker, price, Utc::now())
    }
}

//! The price source abstraction polled by the monitor.

use crate::FeedError;
use async_trait::async_trait;
use stockwatch_core::{PriceQuote, Ticker};

/// Fetches the latest traded price for a ticker.
///
/// `Ok(None)` means the provider has no data right now (market closed,
/// delisted symbol); the caller simply tries again next poll. Implementations
/// neither cache nor retry.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the most recent quote for `ticker`.
    async fn fetch(&self, ticker: &Ticker) -> Result<Option<PriceQuote>, FeedError>;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

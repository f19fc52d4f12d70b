//! Price source replaying pre-recorded outcomes.

use crate::{FeedError, PriceSource};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::Duration;
use stockwatch_core::{PriceQuote, Ticker};

/// One scripted fetch outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Price(Decimal),
    Unavailable,
    Fail(String),
}

/// Source that answers each fetch from a per-ticker queue.
///
/// Exhausted or unknown tickers are unavailable. Counts every fetch so
/// callers can check which tickers were polled.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: DashMap<Ticker, VecDeque<Scripted>>,
    fetches: DashMap<Ticker, usize>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch, simulating a slow provider.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append outcomes for a ticker.
    pub fn script(&self, ticker: &Ticker, steps: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .entry(ticker.clone())
            .or_default()
            .extend(steps);
    }

    /// Append price outcomes for a ticker.
    pub fn script_prices(&self, ticker: &Ticker, prices: impl IntoIterator<Item = Decimal>) {
        self.script(ticker, prices.into_iter().map(Scripted::Price));
    }

    /// Number of fetches made for a ticker so far.
    pub fn fetch_count(&self, ticker: &Ticker) -> usize {
        self.fetches.get(ticker).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch(&self, ticker: &Ticker) -> Result<Option<PriceQuote>, FeedError> {
        *self.fetches.entry(ticker.clone()).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .scripts
            .get_mut(ticker)
            .and_then(|mut queue| queue.pop_front());

        match next {
            Some(Scripted::Price(price)) => Ok(Some(PriceQuote::now(ticker.clone(), price))),
            Some(Scripted::Fail(reason)) => Err(FeedError::Provider {
                ticker: ticker.to_string(),
                reason,
            }),
            Some(Scripted::Unavailable) | None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

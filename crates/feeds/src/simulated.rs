//! Offline price source producing oscillating prices.

use crate::{FeedError, PriceSource};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use stockwatch_core::{PriceQuote, Ticker, WatchEntry};

/// Deterministic demo feed: each ticker swings around a base price.
///
/// Seeding the bases from a watchlist's targets makes every entry cross its
/// threshold within a few polls.
pub struct SimulatedSource {
    bases: DashMap<Ticker, f64>,
    steps: DashMap<Ticker, u64>,
    /// Relative swing around the base (0.03 = ±3%).
    amplitude: f64,
}

impl SimulatedSource {
    pub fn new(amplitude: f64) -> Self {
        Self {
            bases: DashMap::new(),
            steps: DashMap::new(),
            amplitude,
        }
    }

    /// Seed bases from watch targets.
    pub fn seeded_from(entries: &[WatchEntry], amplitude: f64) -> Self {
        let source = Self::new(amplitude);
        for entry in entries {
            source.set_base(entry.ticker.clone(), entry.target_price);
        }
        source
    }

    pub fn set_base(&self, ticker: Ticker, base: Decimal) {
        self.bases.insert(ticker, base.to_f64().unwrap_or(0.0));
    }

    /// Unseeded tickers get a stable base derived from the symbol.
    fn base_for(&self, ticker: &Ticker) -> f64 {
        *self
            .bases
            .entry(ticker.clone())
            .or_insert_with(|| {
                let mut hasher = DefaultHasher::new();
                ticker.hash(&mut hasher);
                10.0 + (hasher.finish() % 500) as f64
            })
            .value()
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new(0.03)
    }
}

#[async_trait]
impl PriceSource for SimulatedSource {
    async fn fetch(&self, ticker: &Ticker) -> Result<Option<PriceQuote>, FeedError> {
        let base = self.base_for(ticker);
        let step = {
            let mut step = self.steps.entry(ticker.clone()).or_insert(0);
            *step += 1;
            *step
        };

        // Starts below the base, rises through it, then falls back.
        let phase = (step as f64 * 0.5) - std::f64::consts::FRAC_PI_2;
        let price = base * (1.0 + phase.sin() * self.amplitude);

        let price = Decimal::from_f64(price.max(0.0))
            .ok_or_else(|| FeedError::Provider {
                ticker: ticker.to_string(),
                reason: "simulated price out of range".to_string(),
            })?
            .round_dp(2);

        Ok(Some(PriceQuote::now(ticker.clone(), price)))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

//! Per-ticker threshold state machine.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use stockwatch_core::Ticker;

/// Notification state of one ticker within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    /// Target not reached yet this session.
    #[default]
    Pending,
    /// Notification already sent this session.
    Fired,
}

/// Result of evaluating one price against a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    NoAction,
    Notify { ticker: Ticker, price: Decimal },
}

/// Decides when a ticker's notification is due.
///
/// A ticker moves `Pending -> Fired` at most once; only `reset` moves it back.
/// Unknown tickers are `Pending`.
#[derive(Debug, Default)]
pub struct ThresholdTracker {
    states: HashMap<Ticker, AlertState>,
}

impl ThresholdTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `price` against `target_price`; reaching the target (`>=`)
    /// fires once.
    pub fn evaluate(&mut self, ticker: &Ticker, price: Decimal, target_price: Decimal) -> Action {
        let state = self.states.entry(ticker.clone()).or_default();
        match *state {
            AlertState::Fired => Action::NoAction,
            AlertState::Pending if price >= target_price => {
                *state = AlertState::Fired;
                Action::Notify {
                    ticker: ticker.clone(),
                    price,
                }
            }
            AlertState::Pending => Action::NoAction,
        }
    }

    /// Return a ticker to `Pending`.
    pub fn reset(&mut self, ticker: &Ticker) {
        self.states.remove(ticker);
    }

    /// Return every ticker to `Pending`.
    pub fn reset_all(&mut self) {
        self.states.clear();
    }

    pub fn state(&self, ticker: &Ticker) -> AlertState {
        self.states.get(ticker).copied().unwrap_or_default()
    }

    #[inline]
    pub fn is_fired(&self, ticker: &Ticker) -> bool {
        self.state(ticker) == AlertState::Fired
    }

    /// Number of tickers that have fired this session.
    pub fn fired_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == AlertState::Fired)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    #[test]
    fn test_unknown_ticker_is_pending() {
        let tracker = ThresholdTracker::new();
        assert_eq!(tracker.state(&ticker("AAPL")), AlertState::Pending);
    }

    #[test]
    fn test_below_target_never_fires() {
        let mut tracker = ThresholdTracker::new();
        let aapl = ticker("AAPL");
        for price in [dec!(0), dec!(149.99), dec!(149.9999)] {
            assert_eq!(tracker.evaluate(&aapl, price, dec!(150)), Action::NoAction);
        }
        assert_eq!(tracker.state(&aapl), AlertState::Pending);
    }

    #[test]
    fn test_equality_counts_as_reached() {
        let mut tracker = ThresholdTracker::new();
        let aapl = ticker("AAPL");
        assert_eq!(
            tracker.evaluate(&aapl, dec!(150.00), dec!(150)),
            Action::Notify {
                ticker: aapl.clone(),
                price: dec!(150.00),
            }
        );
        assert!(tracker.is_fired(&aapl));
    }

    #[test]
    fn test_fires_at_most_once() {
        let mut tracker = ThresholdTracker::new();
        let aapl = ticker("AAPL");
        assert!(matches!(
            tracker.evaluate(&aapl, dec!(151), dec!(150)),
            Action::Notify { .. }
        ));
        for price in [dec!(152), dec!(200), dec!(149), dec!(150)] {
            assert_eq!(tracker.evaluate(&aapl, price, dec!(150)), Action::NoAction);
        }
        assert_eq!(tracker.fired_count(), 1);
    }

    #[test]
    fn test_reset_allows_refire() {
        let mut tracker = ThresholdTracker::new();
        let aapl = ticker("AAPL");
        tracker.evaluate(&aapl, dec!(150), dec!(150));
        tracker.reset(&aapl);
        assert_eq!(tracker.state(&aapl), AlertState::Pending);
        assert!(matches!(
            tracker.evaluate(&aapl, dec!(161), dec!(160)),
            Action::Notify { .. }
        ));
    }

    #[test]
    fn test_tickers_are_independent() {
        let mut tracker = ThresholdTracker::new();
        let aapl = ticker("AAPL");
        let msft = ticker("MSFT");
        tracker.evaluate(&aapl, dec!(151), dec!(150));
        assert!(!tracker.is_fired(&msft));
        assert!(matches!(
            tracker.evaluate(&msft, dec!(400), dec!(400)),
            Action::Notify { .. }
        ));

        tracker.reset_all();
        assert_eq!(tracker.fired_count(), 0);
    }
}

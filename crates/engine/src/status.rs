//! Read-only projections of monitor state for callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use stockwatch_alerts::DeliveryReport;
use stockwatch_core::Ticker;

/// Display state of one watched ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerStatus {
    pub ticker: Ticker,
    pub target_price: Decimal,
    /// Last price seen this session.
    pub last_price: Option<Decimal>,
    pub quoted_at: Option<DateTime<Utc>>,
    /// Whether the notification has been sent this session.
    pub fired: bool,
    /// Most recent fetch problem; cleared by the next successful quote.
    pub last_error: Option<String>,
}

/// Snapshot of the monitor published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub active: bool,
    /// Ticks completed in the current session.
    pub tick_seq: u64,
    /// Most recent per-ticker failure of the session.
    pub last_error: Option<String>,
    /// Watched tickers in watchlist order.
    pub entries: Vec<TickerStatus>,
}

impl MonitorStatus {
    pub fn entry(&self, ticker: &Ticker) -> Option<&TickerStatus> {
        self.entries.iter().find(|e| &e.ticker == ticker)
    }

    pub fn fired_count(&self) -> usize {
        self.entries.iter().filter(|e| e.fired).count()
    }
}

/// A notification dispatched during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub ticker: Ticker,
    pub price: Decimal,
    pub target_price: Decimal,
    pub message: String,
    pub delivery: DeliveryReport,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub seq: u64,
    /// Tickers with a fresh quote.
    pub quoted: Vec<Ticker>,
    /// Tickers the provider had no data for.
    pub unavailable: Vec<Ticker>,
    /// Tickers whose fetch failed, with the reason.
    pub failed: Vec<(Ticker, String)>,
    pub notified: Vec<Notification>,
    /// Set when a stop arrived mid-fetch and the results were dropped.
    pub discarded: bool,
}

impl TickReport {
    /// Tickers attempted in this tick.
    pub fn attempted(&self) -> usize {
        self.quoted.len() + self.unavailable.len() + self.failed.len()
    }
}

/// Change applied by `update_entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryChange {
    /// Ticker was not watched; now watched and pending.
    Added,
    /// Target changed; the ticker is pending again.
    Retargeted,
    /// Same target; state untouched.
    Unchanged,
}

/// Events broadcast by the monitor loop.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Started { entries: usize },
    Stopped,
    Notified(Notification),
    TickCompleted(TickReport),
}

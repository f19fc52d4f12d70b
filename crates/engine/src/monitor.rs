//! Monitoring session state and the body of one tick.
//!
//! `Monitor` owns the watchlist snapshot, the threshold tracker and the
//! per-ticker observations. It is driven by the loop in `handle`, or directly
//! when stepping ticks by hand.

use crate::{
    Action, AlertState, EngineError, EntryChange, MonitorStatus, Notification, ThresholdTracker,
    TickReport, TickerStatus,
};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use stockwatch_alerts::{format_alert_message, NotificationSink};
use stockwatch_core::{
    check_target, validate_watchlist, ConfigError, PriceQuote, Ticker, WatchEntry,
};
use stockwatch_feeds::{FeedError, PriceSource};
use tracing::{debug, error, info, warn};

const NO_DATA: &str = "no data available";

/// Session bookkeeping; reset on every start.
#[derive(Debug, Default)]
struct MonitorSession {
    active: bool,
    tick_seq: u64,
    last_error: Option<String>,
}

/// Latest observation for a ticker.
#[derive(Debug, Default, Clone)]
struct Observation {
    last_price: Option<Decimal>,
    quoted_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Quotes gathered by the fetch half of a tick.
pub struct FetchBatch {
    results: Vec<(WatchEntry, Result<Option<PriceQuote>, FeedError>)>,
}

/// Monitoring session: snapshot, tracker and observations.
pub struct Monitor {
    source: Arc<dyn PriceSource>,
    sink: Arc<dyn NotificationSink>,
    session: MonitorSession,
    tracker: ThresholdTracker,
    snapshot: Vec<WatchEntry>,
    observations: HashMap<Ticker, Observation>,
}

impl Monitor {
    pub fn new(source: Arc<dyn PriceSource>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            source,
            sink,
            session: MonitorSession::default(),
            tracker: ThresholdTracker::new(),
            snapshot: Vec::new(),
            observations: HashMap::new(),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.session.active
    }

    pub fn entry_count(&self) -> usize {
        self.snapshot.len()
    }

    /// Begin a session over `entries`.
    ///
    /// Returns `Ok(false)` without touching anything when already active.
    pub fn start(&mut self, entries: Vec<WatchEntry>) -> Result<bool, ConfigError> {
        if self.session.active {
            debug!("Start requested while active; ignoring");
            return Ok(false);
        }
        validate_watchlist(&entries)?;

        self.tracker.reset_all();
        self.observations.clear();
        self.snapshot = entries;
        self.session = MonitorSession {
            active: true,
            ..Default::default()
        };

        info!(
            entries = self.snapshot.len(),
            source = self.source.name(),
            "Monitoring started"
        );
        Ok(true)
    }

    /// End the session. Returns false if it was not active.
    pub fn stop(&mut self) -> bool {
        if !self.session.active {
            return false;
        }
        self.session.active = false;
        info!(ticks = self.session.tick_seq, "Monitoring stopped");
        true
    }

    /// Set a ticker's target, adding the ticker if it is not watched.
    ///
    /// New tickers and changed targets go back to `Pending`.
    pub fn update_entry(&mut self, ticker: &str, target_price: Decimal) -> Result<EntryChange, ConfigError> {
        let ticker = Ticker::parse(ticker)?;
        check_target(&ticker, target_price)?;

        let change = match self.snapshot.iter_mut().find(|e| e.ticker == ticker) {
            Some(entry) if entry.target_price == target_price => EntryChange::Unchanged,
            Some(entry) => {
                entry.target_price = target_price;
                EntryChange::Retargeted
            }
            None => {
                self.snapshot.push(WatchEntry {
                    ticker: ticker.clone(),
                    target_price,
                });
                EntryChange::Added
            }
        };

        if change != EntryChange::Unchanged {
            self.tracker.reset(&ticker);
        }
        info!(ticker = %ticker, target = %target_price, change = ?change, "Watch entry updated");
        Ok(change)
    }

    /// Stop watching a ticker. Returns false if it was not watched.
    pub fn remove_entry(&mut self, ticker: &str) -> Result<bool, ConfigError> {
        let ticker = Ticker::parse(ticker)?;
        let before = self.snapshot.len();
        self.snapshot.retain(|e| e.ticker != ticker);
        let removed = self.snapshot.len() != before;

        self.tracker.reset(&ticker);
        self.observations.remove(&ticker);
        if removed {
            info!(ticker = %ticker, "Watch entry removed");
        }
        Ok(removed)
    }

    /// Replace the snapshot with a freshly loaded watchlist.
    ///
    /// Entries whose target is unchanged keep their state; new or re-targeted
    /// tickers go back to `Pending`; dropped tickers are forgotten.
    pub fn reload(&mut self, entries: Vec<WatchEntry>) -> Result<(), ConfigError> {
        if !entries.is_empty() {
            validate_watchlist(&entries)?;
        }

        let previous: HashMap<Ticker, Decimal> = self
            .snapshot
            .drain(..)
            .map(|e| (e.ticker, e.target_price))
            .collect();

        for entry in &entries {
            if previous.get(&entry.ticker) != Some(&entry.target_price) {
                self.tracker.reset(&entry.ticker);
            }
        }
        for ticker in previous.keys() {
            if !entries.iter().any(|e| &e.ticker == ticker) {
                self.tracker.reset(ticker);
                self.observations.remove(ticker);
            }
        }

        self.snapshot = entries;
        info!(entries = self.snapshot.len(), "Watchlist reloaded");
        Ok(())
    }

    /// Run one complete tick.
    pub async fn tick(&mut self) -> Result<TickReport, EngineError> {
        let batch = self.fetch_quotes().await?;
        Ok(self.apply_quotes(batch).await)
    }

    /// Fetch every ticker of the current snapshot concurrently.
    ///
    /// Has no effect on session state; the snapshot is read once up front.
    pub async fn fetch_quotes(&self) -> Result<FetchBatch, EngineError> {
        if !self.session.active {
            return Err(EngineError::NotRunning);
        }

        let fetches = self.snapshot.iter().cloned().map(|entry| async move {
            let result = self.source.fetch(&entry.ticker).await;
            (entry, result)
        });

        Ok(FetchBatch {
            results: join_all(fetches).await,
        })
    }

    /// Abandon a tick whose fetch overlapped a stop. Quotes already fetched,
    /// if any, are dropped unseen.
    pub fn discard(&self, batch: Option<FetchBatch>) -> TickReport {
        debug!(
            fetched = batch.map_or(0, |b| b.results.len()),
            "Discarding tick interrupted by stop"
        );
        TickReport {
            seq: self.session.tick_seq,
            discarded: true,
            ..Default::default()
        }
    }

    /// Evaluate fetched quotes and dispatch due notifications.
    pub async fn apply_quotes(&mut self, batch: FetchBatch) -> TickReport {
        self.session.tick_seq += 1;
        let mut report = TickReport {
            seq: self.session.tick_seq,
            ..Default::default()
        };

        for (entry, result) in batch.results {
            let ticker = entry.ticker.clone();
            match result {
                Ok(Some(quote)) => {
                    debug!(ticker = %ticker, price = %quote.price, target = %entry.target_price, "Quote");
                    let observation = self.observations.entry(ticker.clone()).or_default();
                    observation.last_price = Some(quote.price);
                    observation.quoted_at = Some(quote.timestamp);
                    observation.last_error = None;
                    report.quoted.push(ticker.clone());

                    if let Action::Notify { ticker, price } =
                        self.tracker.evaluate(&ticker, quote.price, entry.target_price)
                    {
                        let notification = self.dispatch(ticker, price, entry.target_price, quote.timestamp).await;
                        report.notified.push(notification);
                    }
                }
                Ok(None) => {
                    warn!(ticker = %ticker, "No price data available");
                    self.record_error(&ticker, NO_DATA.to_string());
                    report.unavailable.push(ticker);
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(ticker = %ticker, error = %e, "Price fetch failed");
                    } else {
                        error!(ticker = %ticker, error = %e, "Price fetch failed");
                    }
                    self.record_error(&ticker, e.to_string());
                    report.failed.push((ticker, e.to_string()));
                }
            }
        }

        debug!(
            seq = report.seq,
            quoted = report.quoted.len(),
            unavailable = report.unavailable.len(),
            failed = report.failed.len(),
            notified = report.notified.len(),
            "Tick completed"
        );
        report
    }

    /// Send the alert for a ticker that just fired. The `Fired` state stands
    /// whatever the delivery outcome.
    async fn dispatch(
        &self,
        ticker: Ticker,
        price: Decimal,
        target_price: Decimal,
        at: DateTime<Utc>,
    ) -> Notification {
        let message = format_alert_message(&ticker, price, target_price, at);
        let delivery = self.sink.notify(&message).await;

        info!(
            ticker = %ticker,
            price = %price,
            target = %target_price,
            delivered = delivery.delivered.len(),
            failed = delivery.failed.len(),
            "Target reached; notification dispatched"
        );

        Notification {
            ticker,
            price,
            target_price,
            message,
            delivery,
        }
    }

    fn record_error(&mut self, ticker: &Ticker, message: String) {
        self.session.last_error = Some(format!("{}: {}", ticker, message));
        self.observations.entry(ticker.clone()).or_default().last_error = Some(message);
    }

    /// Current state for display.
    pub fn status(&self) -> MonitorStatus {
        let entries = self
            .snapshot
            .iter()
            .map(|entry| {
                let observation = self
                    .observations
                    .get(&entry.ticker)
                    .cloned()
                    .unwrap_or_default();
                TickerStatus {
                    ticker: entry.ticker.clone(),
                    target_price: entry.target_price,
                    last_price: observation.last_price,
                    quoted_at: observation.quoted_at,
                    fired: self.tracker.state(&entry.ticker) == AlertState::Fired,
                    last_error: observation.last_error,
                }
            })
            .collect();

        MonitorStatus {
            active: self.session.active,
            tick_seq: self.session.tick_seq,
            last_error: self.session.last_error.clone(),
            entries,
        }
    }
}

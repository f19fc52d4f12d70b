//! Control handle and background loop for a monitor.
//!
//! The loop task owns the [`Monitor`]. Callers talk to it through a cloneable
//! [`MonitorHandle`]: commands travel over an mpsc queue with a oneshot reply,
//! status is published on a watch channel and events on a broadcast channel.
//!
//! `stop` bumps a generation counter before queueing its command so that a
//! tick still fetching quotes is abandoned instead of delaying the stop. The
//! loop remembers the generation of the last stop it handled; while a newer
//! one is still queued, no tick runs.

use crate::{EngineError, EntryChange, Monitor, MonitorEvent, MonitorStatus, TickReport};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use stockwatch_alerts::NotificationSink;
use stockwatch_core::{ConfigError, WatchEntry};
use stockwatch_feeds::PriceSource;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the monitor loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Wait between ticks.
    pub poll_interval: Duration,
    /// Capacity of the command queue.
    pub command_buffer: usize,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl MonitorConfig {
    /// Shortest accepted poll interval.
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Default::default()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

enum Command {
    Start {
        entries: Vec<WatchEntry>,
        reply: oneshot::Sender<Result<bool, ConfigError>>,
    },
    Stop {
        generation: u64,
        reply: oneshot::Sender<bool>,
    },
    Tick {
        reply: oneshot::Sender<Result<TickReport, EngineError>>,
    },
    UpdateEntry {
        ticker: String,
        target_price: Decimal,
        reply: oneshot::Sender<Result<EntryChange, ConfigError>>,
    },
    RemoveEntry {
        ticker: String,
        reply: oneshot::Sender<Result<bool, ConfigError>>,
    },
    Reload {
        entries: Vec<WatchEntry>,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running monitor loop.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<MonitorStatus>,
    events: broadcast::Sender<MonitorEvent>,
    stop_generation: Arc<watch::Sender<u64>>,
}

impl MonitorHandle {
    /// Spawn the loop on the current runtime. It runs until `shutdown` or
    /// until every handle is dropped.
    pub fn spawn(
        source: Arc<dyn PriceSource>,
        sink: Arc<dyn NotificationSink>,
        mut config: MonitorConfig,
    ) -> (Self, JoinHandle<()>) {
        if config.poll_interval < MonitorConfig::MIN_POLL_INTERVAL {
            warn!(
                requested_ms = config.poll_interval.as_millis() as u64,
                "Poll interval too short; using minimum"
            );
            config.poll_interval = MonitorConfig::MIN_POLL_INTERVAL;
        }

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(MonitorStatus::default());
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        let (stop_tx, stop_rx) = watch::channel(0u64);

        let monitor_loop = MonitorLoop {
            monitor: Monitor::new(source, sink),
            poll_interval: config.poll_interval,
            commands: command_rx,
            status: status_tx,
            events: event_tx.clone(),
            stop_generation: stop_rx,
            handled_generation: 0,
            interval: None,
        };
        let task = tokio::spawn(monitor_loop.run());

        let handle = Self {
            commands: command_tx,
            status: status_rx,
            events: event_tx,
            stop_generation: Arc::new(stop_tx),
        };
        (handle, task)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| EngineError::Closed)?;
        response.await.map_err(|_| EngineError::Closed)
    }

    /// Start monitoring `entries`. `Ok(false)` if a session is already active.
    pub async fn start(&self, entries: Vec<WatchEntry>) -> Result<bool, EngineError> {
        Ok(self
            .request(|reply| Command::Start { entries, reply })
            .await??)
    }

    /// Stop monitoring. Returns whether a session was active.
    pub async fn stop(&self) -> Result<bool, EngineError> {
        let mut generation = 0;
        self.stop_generation.send_modify(|current| {
            *current += 1;
            generation = *current;
        });
        self.request(|reply| Command::Stop { generation, reply }).await
    }

    /// Run one tick now, outside the schedule.
    pub async fn tick(&self) -> Result<TickReport, EngineError> {
        self.request(|reply| Command::Tick { reply }).await?
    }

    pub async fn update_entry(
        &self,
        ticker: &str,
        target_price: Decimal,
    ) -> Result<EntryChange, EngineError> {
        let ticker = ticker.to_string();
        Ok(self
            .request(|reply| Command::UpdateEntry {
                ticker,
                target_price,
                reply,
            })
            .await??)
    }

    pub async fn remove_entry(&self, ticker: &str) -> Result<bool, EngineError> {
        let ticker = ticker.to_string();
        Ok(self
            .request(|reply| Command::RemoveEntry { ticker, reply })
            .await??)
    }

    /// Replace the watched entries while keeping unchanged tickers' state.
    pub async fn reload(&self, entries: Vec<WatchEntry>) -> Result<(), EngineError> {
        Ok(self
            .request(|reply| Command::Reload { entries, reply })
            .await??)
    }

    /// Stop the loop task. Later requests fail with `Closed`.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.stop_generation.send_modify(|generation| *generation += 1);
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Latest published status.
    pub fn status(&self) -> MonitorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MonitorStatus> {
        self.status.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }
}

struct MonitorLoop {
    monitor: Monitor,
    poll_interval: Duration,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<MonitorStatus>,
    events: broadcast::Sender<MonitorEvent>,
    stop_generation: watch::Receiver<u64>,
    /// Generation of the last stop handled.
    handled_generation: u64,
    /// Present only while a session is active.
    interval: Option<Interval>,
}

impl MonitorLoop {
    async fn run(mut self) {
        debug!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Monitor loop running");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown { reply }) => {
                            self.monitor.stop();
                            self.publish();
                            let _ = reply.send(());
                            break;
                        }
                        Some(command) => self.handle(command).await,
                        None => break,
                    }
                }
                _ = next_tick(&mut self.interval) => {
                    if let Err(e) = self.run_tick().await {
                        debug!(error = %e, "Scheduled tick skipped");
                    }
                }
            }
        }

        info!("Monitor loop exited");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { entries, reply } => {
                let result = self.monitor.start(entries);
                if let Ok(true) = result {
                    let mut interval = tokio::time::interval(self.poll_interval);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    self.interval = Some(interval);
                    self.emit(MonitorEvent::Started {
                        entries: self.monitor.entry_count(),
                    });
                }
                self.publish();
                let _ = reply.send(result);
            }
            Command::Stop { generation, reply } => {
                self.handled_generation = self.handled_generation.max(generation);
                self.interval = None;
                let stopped = self.monitor.stop();
                if stopped {
                    self.emit(MonitorEvent::Stopped);
                }
                self.publish();
                let _ = reply.send(stopped);
            }
            Command::Tick { reply } => {
                let result = self.run_tick().await;
                let _ = reply.send(result);
            }
            Command::UpdateEntry {
                ticker,
                target_price,
                reply,
            } => {
                let result = self.monitor.update_entry(&ticker, target_price);
                self.publish();
                let _ = reply.send(result);
            }
            Command::RemoveEntry { ticker, reply } => {
                let result = self.monitor.remove_entry(&ticker);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Reload { entries, reply } => {
                let result = self.monitor.reload(entries);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Fetch, then evaluate and notify. A stop requested before or while
    /// quotes are fetched abandons the tick. Publishes status when done.
    async fn run_tick(&mut self) -> Result<TickReport, EngineError> {
        if !self.monitor.is_active() {
            return Err(EngineError::NotRunning);
        }

        let generation = self.handled_generation;
        let fetched = if *self.stop_generation.borrow_and_update() != generation {
            debug!("Stop pending; skipping tick");
            None
        } else {
            tokio::select! {
                batch = self.monitor.fetch_quotes() => Some(batch?),
                _ = stop_requested(&mut self.stop_generation, generation) => None,
            }
        };

        let report = match fetched {
            Some(batch) if *self.stop_generation.borrow() == generation => {
                let report = self.monitor.apply_quotes(batch).await;
                for notification in &report.notified {
                    self.emit(MonitorEvent::Notified(notification.clone()));
                }
                report
            }
            batch => self.monitor.discard(batch),
        };

        self.publish();
        self.emit(MonitorEvent::TickCompleted(report.clone()));
        Ok(report)
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.status.send_replace(self.monitor.status());
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves once the stop generation moves past `generation`.
async fn stop_requested(rx: &mut watch::Receiver<u64>, generation: u64) {
    while *rx.borrow_and_update() == generation {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, recording_sink, ticker, RecordingSink};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use stockwatch_feeds::ScriptedSource;
    use tokio::time::{timeout, Instant};

    fn spawn(
        source: &Arc<ScriptedSource>,
        sink: &Arc<RecordingSink>,
        poll_interval: Duration,
    ) -> (MonitorHandle, JoinHandle<()>) {
        MonitorHandle::spawn(
            source.clone(),
            sink.clone(),
            MonitorConfig::with_poll_interval(poll_interval),
        )
    }

    async fn next_tick_report(events: &mut broadcast::Receiver<MonitorEvent>) -> TickReport {
        loop {
            match timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Ok(MonitorEvent::TickCompleted(report))) => return report,
                Ok(Ok(_)) => continue,
                other => panic!("no tick completed: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_first_tick_runs_immediately() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        source.script_prices(&ticker("AAPL"), [dec!(151)]);

        let (handle, _task) = spawn(&source, &sink, Duration::from_secs(3600));
        let mut events = handle.subscribe_events();

        assert!(handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap());
        let report = next_tick_report(&mut events).await;

        assert_eq!(report.seq, 1);
        assert_eq!(report.notified.len(), 1);
        assert_eq!(sink.count(), 1);
        assert!(handle.status().entry(&ticker("AAPL")).unwrap().fired);
    }

    #[tokio::test]
    async fn test_interval_drives_ticks() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        source.script_prices(&ticker("AAPL"), [dec!(140), dec!(145), dec!(155)]);

        let (handle, _task) = spawn(&source, &sink, Duration::from_millis(20));
        let mut events = handle.subscribe_events();
        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();

        let mut seq = 0;
        while seq < 3 {
            seq = next_tick_report(&mut events).await.seq;
        }
        assert_eq!(sink.count(), 1);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_interrupts_wait() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        source.script_prices(&ticker("AAPL"), [dec!(100)]);

        let (handle, _task) = spawn(&source, &sink, Duration::from_secs(3600));
        let mut events = handle.subscribe_events();
        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();
        next_tick_report(&mut events).await;

        let started = Instant::now();
        assert!(handle.stop().await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));

        let status = handle.status();
        assert!(!status.active);
        assert_eq!(status.tick_seq, 1);
        assert_eq!(source.fetch_count(&ticker("AAPL")), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        let (handle, _task) = spawn(&source, &sink, Duration::from_secs(3600));

        assert!(!handle.stop().await.unwrap());
        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();
        assert!(handle.stop().await.unwrap());
        assert!(!handle.stop().await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_during_fetch_discards_results() {
        let source = Arc::new(ScriptedSource::new().with_delay(Duration::from_millis(500)));
        let sink = recording_sink();
        source.script_prices(&ticker("AAPL"), [dec!(151)]);

        let (handle, _task) = spawn(&source, &sink, Duration::from_secs(3600));
        let mut events = handle.subscribe_events();
        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();

        // Let the first fetch get underway.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.fetch_count(&ticker("AAPL")), 1);

        let started = Instant::now();
        assert!(handle.stop().await.unwrap());
        assert!(started.elapsed() < Duration::from_millis(400));

        let report = next_tick_report(&mut events).await;
        assert!(report.discarded);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sink.count(), 0);
        let status = handle.status();
        assert_eq!(status.tick_seq, 0);
        assert!(!status.entries[0].fired);
        assert_eq!(status.entries[0].last_price, None);
    }

    #[tokio::test]
    async fn test_tick_skipped_while_stop_queued() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        source.script_prices(&ticker("AAPL"), [dec!(151)]);

        let (_command_tx, command_rx) = mpsc::channel(1);
        let (status_tx, _status_rx) = watch::channel(MonitorStatus::default());
        let (event_tx, _) = broadcast::channel(8);
        let (stop_tx, stop_rx) = watch::channel(0u64);
        let mut monitor_loop = MonitorLoop {
            monitor: Monitor::new(source.clone(), sink.clone()),
            poll_interval: Duration::from_secs(3600),
            commands: command_rx,
            status: status_tx,
            events: event_tx,
            stop_generation: stop_rx,
            handled_generation: 0,
            interval: None,
        };
        monitor_loop
            .monitor
            .start(vec![entry("AAPL", dec!(150))])
            .unwrap();

        // Generation moved on, but the Stop command has not been handled yet.
        stop_tx.send_modify(|generation| *generation += 1);

        let report = monitor_loop.run_tick().await.unwrap();
        assert!(report.discarded);
        assert_eq!(source.fetch_count(&ticker("AAPL")), 0);
        assert_eq!(sink.count(), 0);

        let (reply, _response) = oneshot::channel();
        monitor_loop
            .handle(Command::Stop {
                generation: 1,
                reply,
            })
            .await;
        assert_eq!(monitor_loop.handled_generation, 1);
        assert!(!monitor_loop.monitor.is_active());

        // A later session ticks normally.
        monitor_loop
            .monitor
            .start(vec![entry("AAPL", dec!(150))])
            .unwrap();
        let report = monitor_loop.run_tick().await.unwrap();
        assert!(!report.discarded);
        assert_eq!(report.notified.len(), 1);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_manual_tick() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        source.script_prices(&ticker("AAPL"), [dec!(140), dec!(150)]);

        let (handle, _task) = spawn(&source, &sink, Duration::from_secs(3600));
        assert_eq!(handle.tick().await.unwrap_err(), EngineError::NotRunning);

        let mut events = handle.subscribe_events();
        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();
        next_tick_report(&mut events).await;

        let report = handle.tick().await.unwrap();
        assert_eq!(report.seq, 2);
        assert_eq!(report.notified.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_commands_update_status() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        let (handle, _task) = spawn(&source, &sink, Duration::from_secs(3600));
        let mut status = handle.subscribe_status();

        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();
        assert_eq!(
            handle.update_entry("msft", dec!(400)).await.unwrap(),
            EntryChange::Added
        );
        assert!(handle.remove_entry("AAPL").await.unwrap());
        assert!(matches!(
            handle.update_entry("MSFT", dec!(-5)).await,
            Err(EngineError::Config(ConfigError::InvalidTarget { .. }))
        ));

        let current = status.borrow_and_update().clone();
        assert_eq!(current.entries.len(), 1);
        assert_eq!(current.entries[0].ticker, ticker("MSFT"));
        assert_eq!(current.entries[0].target_price, dec!(400));
    }

    #[tokio::test]
    async fn test_start_rejects_empty_watchlist() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        let (handle, _task) = spawn(&source, &sink, Duration::from_secs(3600));

        assert_eq!(
            handle.start(Vec::new()).await.unwrap_err(),
            EngineError::Config(ConfigError::EmptyWatchlist)
        );
        assert!(!handle.status().active);
    }

    #[tokio::test]
    async fn test_shutdown_ends_loop() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        let (handle, task) = spawn(&source, &sink, Duration::from_secs(3600));
        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();

        handle.shutdown().await.unwrap();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert!(!handle.status().active);
        assert_eq!(handle.stop().await.unwrap_err(), EngineError::Closed);
    }

    #[tokio::test]
    async fn test_short_interval_is_clamped() {
        let source = Arc::new(ScriptedSource::new());
        let sink = recording_sink();
        let (handle, _task) = spawn(&source, &sink, Duration::ZERO);

        handle.start(vec![entry("AAPL", dec!(150))]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        handle.stop().await.unwrap();

        let fetches = source.fetch_count(&ticker("AAPL"));
        assert!((1..20).contains(&fetches), "fetches = {}", fetches);
    }
}

//! Stockwatch - Headless Server
//!
//! Polls stock prices and notifies once per session when a watched ticker
//! reaches its target price.

mod api;
mod config;

use api::AppState;
use clap::Parser;
use config::{AppConfig, ConfigFileError, SourceKind};
use std::sync::Arc;
use std::time::Duration;
use stockwatch_alerts::{Database, DbError, DeliveryError, LogSink, MultiChannelSink, NotificationSink};
use stockwatch_core::{MemoryWatchlistStore, StoreError, WatchEntry, WatchlistStore};
use stockwatch_engine::{EngineError, MonitorEvent, MonitorHandle};
use stockwatch_feeds::{PriceSource, SimulatedSource, YahooChartSource};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Stockwatch CLI
#[derive(Parser, Debug)]
#[command(name = "stockwatch")]
#[command(about = "Stock price target monitor", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "stockwatch.json")]
    config: String,

    /// User whose watchlist to monitor
    #[arg(short, long)]
    user: Option<String>,

    /// Seconds between price polls
    #[arg(short, long)]
    interval_secs: Option<u64>,

    /// Log level: trace, debug, info, warn, error [default: from config, else info]
    #[arg(short, long)]
    log_level: Option<String>,

    /// Use simulated prices instead of the live feed
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Log alerts instead of delivering them
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// HTTP control API port
    #[arg(long)]
    http_port: Option<u16>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(secs) = self.interval_secs {
            config.monitor.poll_interval_secs = secs;
        }
        if self.simulate {
            config.source.kind = SourceKind::Simulated;
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }

    /// Load the config file and apply environment and CLI overrides.
    fn load_config(&self) -> Result<AppConfig, ConfigFileError> {
        let mut config = AppConfig::load(&self.config)?;
        config.apply_env();
        self.apply(&mut config);
        Ok(config)
    }
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigFileError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to build price source: {0}")]
    Source(String),
    #[error(transparent)]
    Channel(#[from] DeliveryError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Failed to start HTTP API: {0}")]
    Http(#[from] std::io::Error),
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn WatchlistStore>, StartupError> {
    match &config.storage.database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            info!("  Database: {}", url);
            Ok(Arc::new(db))
        }
        None => {
            warn!("No database configured; watchlist changes will not survive a restart");
            Ok(Arc::new(MemoryWatchlistStore::new()))
        }
    }
}

/// Load the user's watchlist, seeding it from the config on first run.
async fn load_watchlist(
    store: &dyn WatchlistStore,
    config: &AppConfig,
) -> Result<Vec<WatchEntry>, StartupError> {
    let stored = store.load(&config.user).await?;
    if !stored.is_empty() || config.watchlist.is_empty() {
        return Ok(stored);
    }

    info!(
        entries = config.watchlist.len(),
        "Seeding watchlist from config"
    );
    store.save(&config.user, &config.watchlist).await?;
    Ok(config.watchlist.clone())
}

fn build_source(
    config: &AppConfig,
    watchlist: &[WatchEntry],
) -> Result<Arc<dyn PriceSource>, StartupError> {
    match config.source.kind {
        SourceKind::Yahoo => {
            let source = YahooChartSource::new(config.source.yahoo_config())
                .map_err(|e| StartupError::Source(e.to_string()))?;
            info!("📡 Using LIVE Yahoo Finance prices");
            Ok(Arc::new(source))
        }
        SourceKind::Simulated => {
            info!("🎮 Using SIMULATED prices");
            Ok(Arc::new(SimulatedSource::seeded_from(
                watchlist,
                config.source.amplitude,
            )))
        }
    }
}

fn build_sink(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn NotificationSink>, StartupError> {
    if dry_run {
        info!("Dry run: alerts are logged, not delivered");
        return Ok(Arc::new(LogSink));
    }
    Ok(Arc::new(MultiChannelSink::from_configs(&config.channels)?))
}

async fn log_events(mut events: broadcast::Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::TickCompleted(report)) if !report.failed.is_empty() => {
                warn!(
                    seq = report.seq,
                    failed = report.failed.len(),
                    attempted = report.attempted(),
                    "Tick completed with fetch failures"
                );
            }
            Ok(MonitorEvent::TickCompleted(report)) => {
                debug!(seq = report.seq, quoted = report.quoted.len(), "Tick completed");
            }
            Ok(MonitorEvent::Notified(notification)) if !notification.delivery.is_complete() => {
                warn!(
                    ticker = %notification.ticker,
                    failed = notification.delivery.failed.len(),
                    "Alert not delivered to every channel"
                );
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run(args: Args, config: AppConfig) -> Result<(), StartupError> {
    info!("📈 Stockwatch starting...");
    info!("  User: {}", config.user);
    info!("  Poll Interval: {}s", config.monitor.poll_interval_secs);
    info!("  Source: {:?}", config.source.kind);
    info!("  Channels: {}", config.channels.len());
    info!("  Dry Run: {}", args.dry_run);

    let store = open_store(&config).await?;
    let watchlist = load_watchlist(store.as_ref(), &config).await?;

    let source = build_source(&config, &watchlist)?;
    let sink = build_sink(&config, args.dry_run)?;

    let (engine, engine_task) = MonitorHandle::spawn(source, sink, config.monitor_config());
    tokio::spawn(log_events(engine.subscribe_events()));

    if watchlist.is_empty() {
        warn!("Watchlist is empty; add entries with PUT /watchlist/:ticker, then POST /monitor/start");
    } else {
        engine.start(watchlist).await?;
    }

    let http_task = if config.http.enabled {
        let state = AppState::new(engine.clone(), store.clone(), config.user.clone());
        Some(api::start_http_server(state, config.http.port).await?)
    } else {
        None
    };

    info!("Press Ctrl+C to stop...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    warn!("Shutdown signal received");
    let final_status = engine.status();
    engine.stop().await?;
    engine.shutdown().await?;
    let _ = tokio::time::timeout(Duration::from_secs(2), engine_task).await;

    if let Some(task) = http_task {
        task.abort();
    }

    info!("📊 Final Status:");
    info!("  Ticks: {}", final_status.tick_seq);
    info!("  Alerts fired: {}", final_status.fired_count());

    info!("👋 Stockwatch stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let config = args.load_config();
    let level = match &config {
        Ok(config) => config.log_level.as_str(),
        Err(_) => args.log_level.as_deref().unwrap_or("info"),
    };
    init_logging(level);

    let result = match config {
        Ok(config) => run(args, config).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

//! Application configuration.
//!
//! Read from a JSON file, then overridden by environment variables and CLI
//! flags. Credentials only ever come from the file or the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stockwatch_alerts::ChannelConfig;
use stockwatch_core::WatchEntry;
use stockwatch_engine::MonitorConfig;
use stockwatch_feeds::YahooConfig;
use thiserror::Error;

pub const ENV_LINE_TOKENS: &str = "STOCKWATCH_LINE_TOKENS";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "STOCKWATCH_TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "STOCKWATCH_TELEGRAM_CHAT_ID";
pub const ENV_DATABASE_URL: &str = "STOCKWATCH_DATABASE_URL";

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Whose watchlist to monitor.
    pub user: String,
    pub monitor: MonitorSettings,
    pub source: SourceSettings,
    /// Notification channels; may be empty.
    pub channels: Vec<ChannelConfig>,
    pub storage: StorageSettings,
    pub http: HttpSettings,
    /// Initial watchlist, saved to the store when the user has none yet.
    pub watchlist: Vec<WatchEntry>,
    /// Logging level.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user: "default".to_string(),
            monitor: MonitorSettings::default(),
            source: SourceSettings::default(),
            channels: Vec::new(),
            storage: StorageSettings::default(),
            http: HttpSettings::default(),
            watchlist: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigFileError::Io {
                    path: display,
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigFileError::Parse {
            path: display,
            source,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(tokens) = lookup(ENV_LINE_TOKENS) {
            self.channels.extend(
                tokens
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ChannelConfig::line_notify),
            );
        }

        if let (Some(token), Some(chat_id)) =
            (lookup(ENV_TELEGRAM_BOT_TOKEN), lookup(ENV_TELEGRAM_CHAT_ID))
        {
            if !token.is_empty() && !chat_id.is_empty() {
                self.channels.push(ChannelConfig::telegram(token, chat_id));
            }
        }

        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|u| !u.is_empty()) {
            self.storage.database_url = Some(url);
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::with_poll_interval(Duration::from_secs(self.monitor.poll_interval_secs))
    }
}

/// Polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between ticks.
    pub poll_interval_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
        }
    }
}

/// Which price source to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Yahoo,
    Simulated,
}

/// Price source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// Overrides the Yahoo API root.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Relative swing of simulated prices.
    pub amplitude: f64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Yahoo,
            base_url: None,
            timeout_secs: 10,
            amplitude: 0.03,
        }
    }
}

impl SourceSettings {
    pub fn yahoo_config(&self) -> YahooConfig {
        let defaults = YahooConfig::default();
        YahooConfig {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(self.timeout_secs),
            ..defaults
        }
    }
}

/// Watchlist storage. Without a database URL the watchlist lives in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_url: Option<String>,
}

/// HTTP control API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

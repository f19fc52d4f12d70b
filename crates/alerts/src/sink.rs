//! Fan-out notification sink.

use crate::channel::{ChannelConfig, NotificationChannel};
use crate::DeliveryError;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of one `notify` call across all channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Channels that accepted the message.
    pub delivered: Vec<String>,
    /// Channels that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    /// True when no channel failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Delivers alert messages. Best effort: never fails as a whole.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &str) -> DeliveryReport;
}

/// Sink delivering to every configured channel independently.
pub struct MultiChannelSink {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl MultiChannelSink {
    /// Timeout applied to each channel request.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        if channels.is_empty() {
            warn!("No notification channels configured; alerts will not be delivered");
        } else {
            info!(channels = channels.len(), "Notification channels ready");
        }
        Self { channels }
    }

    /// Build channels from config entries, sharing one HTTP client.
    pub fn from_configs(configs: &[ChannelConfig]) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;

        let channels = configs
            .iter()
            .enumerate()
            .map(|(index, config)| config.build(index, client.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(channels))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl NotificationSink for MultiChannelSink {
    async fn notify(&self, message: &str) -> DeliveryReport {
        let deliveries = self.channels.iter().map(|channel| async move {
            (channel.name().to_string(), channel.deliver(message).await)
        });

        let mut report = DeliveryReport::default();
        for (name, result) in join_all(deliveries).await {
            match result {
                Ok(()) => {
                    info!(channel = %name, "Notification sent");
                    report.delivered.push(name);
                }
                Err(e) => {
                    error!(channel = %name, error = %e, "Failed to send notification");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }
}

/// Sink that only logs messages, for dry runs.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, message: &str) -> DeliveryReport {
        info!(message = message, "Dry run: notification not delivered");
        DeliveryReport::default()
    }
}

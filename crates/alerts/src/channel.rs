//! Notification channels.
//!
//! Each channel is addressed by an opaque credential and receives one
//! plain-text message per delivery through an HTTP POST.

use crate::DeliveryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const LINE_NOTIFY_ENDPOINT: &str = "https://notify-api.line.me/api/notify";
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// A destination for alert messages.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Label used in logs and delivery reports. Never contains the credential.
    fn name(&self) -> &str;

    /// Deliver one message.
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Supported channel transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// LINE Notify: form POST with a bearer token.
    LineNotify,
    /// Telegram Bot API `sendMessage`.
    Telegram,
    /// JSON POST `{"text": ...}` to an arbitrary URL.
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::LineNotify => "line_notify",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Webhook => "webhook",
        }
    }
}

/// Channel settings as they appear in the application config.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub kind: ChannelKind,
    /// Optional label; defaults to `<kind>#<index>`.
    #[serde(default)]
    pub name: Option<String>,
    /// Access token or bot token.
    #[serde(default)]
    pub token: String,
    /// Telegram chat to post into.
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Webhook URL, or an endpoint override for the other kinds.
    #[serde(default)]
    pub url: Option<String>,
}

impl std::fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .field("url", &self.url)
            .finish()
    }
}

impl ChannelConfig {
    pub fn line_notify(token: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::LineNotify,
            name: None,
            token: token.into(),
            chat_id: None,
            url: None,
        }
    }

    pub fn telegram(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::Telegram,
            name: None,
            token: token.into(),
            chat_id: Some(chat_id.into()),
            url: None,
        }
    }

    pub fn webhook(url: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::Webhook,
            name: None,
            token: String::new(),
            chat_id: None,
            url: Some(url.into()),
        }
    }

    /// Set the endpoint URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Label for this channel at position `index` in the config.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}#{}", self.kind.as_str(), index))
    }

    /// Build the channel, sharing `client` for its requests.
    pub fn build(
        &self,
        index: usize,
        client: reqwest::Client,
    ) -> Result<Arc<dyn NotificationChannel>, DeliveryError> {
        let name = self.label(index);
        match self.kind {
            ChannelKind::LineNotify => {
                if self.token.is_empty() {
                    return Err(DeliveryError::InvalidConfig(format!("{name}: missing token")));
                }
                Ok(Arc::new(LineNotifyChannel {
                    name,
                    token: self.token.clone(),
                    endpoint: self
                        .url
                        .clone()
                        .unwrap_or_else(|| LINE_NOTIFY_ENDPOINT.to_string()),
                    client,
                }))
            }
            ChannelKind::Telegram => {
                if self.token.is_empty() {
                    return Err(DeliveryError::InvalidConfig(format!("{name}: missing token")));
                }
                let chat_id = self
                    .chat_id
                    .clone()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| DeliveryError::InvalidConfig(format!("{name}: missing chat_id")))?;
                Ok(Arc::new(TelegramChannel {
                    name,
                    token: self.token.clone(),
                    chat_id,
                    api_base: self
                        .url
                        .clone()
                        .unwrap_or_else(|| TELEGRAM_API_BASE.to_string()),
                    client,
                }))
            }
            ChannelKind::Webhook => {
                let url = self
                    .url
                    .clone()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| DeliveryError::InvalidConfig(format!("{name}: missing url")))?;
                Ok(Arc::new(WebhookChannel {
                    name,
                    url,
                    token: Some(self.token.clone()).filter(|t| !t.is_empty()),
                    client,
                }))
            }
        }
    }
}

/// Map a completed response to a delivery result.
fn check_response(channel: &str, response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if !status.is_success() {
        return Err(DeliveryError::Http {
            channel: channel.to_string(),
            status: status.as_u16(),
        });
    }
    debug!(channel = channel, status = status.as_u16(), "Delivered");
    Ok(())
}

fn transport_error(channel: &str, err: reqwest::Error) -> DeliveryError {
    DeliveryError::Transport {
        channel: channel.to_string(),
        reason: err.without_url().to_string(),
    }
}

/// LINE Notify channel.
pub struct LineNotifyChannel {
    name: String,
    token: String,
    endpoint: String,
    client: reqwest::Client,
}

#[async_trait]
impl NotificationChannel for LineNotifyChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .form(&[("message", message)])
            .send()
            .await
            .map_err(|e| transport_error(&self.name, e))?;
        check_response(&self.name, response)
    }
}

/// Telegram Bot API channel.
pub struct TelegramChannel {
    name: String,
    token: String,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        );

        let params = [
            ("chat_id", self.chat_id.as_str()),
            ("text", message),
            ("disable_web_page_preview", "true"),
        ];

        // The URL embeds the bot token; transport_error strips it.
        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(&self.name, e))?;
        check_response(&self.name, response)
    }
}

/// Generic JSON webhook channel.
pub struct WebhookChannel {
    name: String,
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": message }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.name, e))?;
        check_response(&self.name, response)
    }
}

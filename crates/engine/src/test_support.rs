//! Doubles shared by the engine tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use stockwatch_alerts::{DeliveryError, DeliveryReport, NotificationChannel, NotificationSink};
use stockwatch_core::{Ticker, WatchEntry};

/// Sink remembering every message it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, message: &str) -> DeliveryReport {
        self.messages.lock().unwrap().push(message.to_string());
        DeliveryReport {
            delivered: vec!["recording".to_string()],
            failed: Vec::new(),
        }
    }
}

/// Channel counting deliveries.
#[derive(Debug, Default)]
pub struct CountingChannel {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationChannel for CountingChannel {
    fn name(&self) -> &str {
        "counting"
    }

    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Channel that always fails.
#[derive(Debug, Default)]
pub struct BrokenChannel;

#[async_trait]
impl NotificationChannel for BrokenChannel {
    fn name(&self) -> &str {
        "broken"
    }

    async fn deliver(&self, _message: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError::Http {
            channel: "broken".to_string(),
            status: 503,
        })
    }
}

pub fn ticker(raw: &str) -> Ticker {
    Ticker::parse(raw).unwrap()
}

pub fn entry(raw: &str, target_price: Decimal) -> WatchEntry {
    WatchEntry::new(raw, target_price).unwrap()
}

pub fn recording_sink() -> Arc<RecordingSink> {
    Arc::new(RecordingSink::default())
}

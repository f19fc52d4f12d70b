//! Notification delivery and watchlist storage.
//!
//! This crate provides:
//! - Notification channels (LINE Notify, Telegram, generic webhook)
//! - A fan-out sink that delivers to every channel independently
//! - SQLite-based watchlist storage

pub mod channel;
pub mod db;
pub mod error;
pub mod message;
pub mod sink;

pub use channel::{ChannelConfig, ChannelKind, NotificationChannel};
pub use db::{Database, DbError};
pub use error::DeliveryError;
pub use message::format_alert_message;
pub use sink::{DeliveryReport, LogSink, MultiChannelSink, NotificationSink};

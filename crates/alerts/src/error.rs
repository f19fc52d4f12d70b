//! Error types for notification delivery.

use thiserror::Error;

/// Failure delivering to a single channel, or building one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("{channel}: request failed: {reason}")]
    Transport { channel: String, reason: String },

    #[error("{channel}: endpoint returned HTTP {status}")]
    Http { channel: String, status: u16 },

    #[error("Invalid channel configuration: {0}")]
    InvalidConfig(String),
}

//! Error types for engine control operations.

use stockwatch_core::ConfigError;
use thiserror::Error;

/// Errors surfaced to callers of the monitor.
///
/// Per-ticker and per-channel failures never appear here; they are logged and
/// recorded in the status instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Monitor is not running")]
    NotRunning,

    #[error("Monitor loop has shut down")]
    Closed,
}

//! Error types for price source operations.

use thiserror::Error;

/// Provider or transport failure while fetching a quote.
///
/// "No data" is not an error; sources return `Ok(None)` for that.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("{ticker}: request failed: {reason}")]
    Transport { ticker: String, reason: String },

    #[error("{ticker}: request timed out")]
    Timeout { ticker: String },

    #[error("{ticker}: provider returned HTTP {status}")]
    Http { ticker: String, status: u16 },

    #[error("{ticker}: rate limit exceeded")]
    RateLimited { ticker: String },

    #[error("{ticker}: failed to parse response: {reason}")]
    Parse { ticker: String, reason: String },

    #[error("{ticker}: {reason}")]
    Provider { ticker: String, reason: String },
}

impl FeedError {
    /// Ticker the failed fetch was for.
    pub fn ticker(&self) -> &str {
        match self {
            FeedError::Transport { ticker, .. }
            | FeedError::Timeout { ticker }
            | FeedError::Http { ticker, .. }
            | FeedError::RateLimited { ticker }
            | FeedError::Parse { ticker, .. }
            | FeedError::Provider { ticker, .. } => ticker,
        }
    }

    pub(crate) fn from_reqwest(ticker: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout {
                ticker: ticker.to_string(),
            }
        } else if err.is_decode() {
            FeedError::Parse {
                ticker: ticker.to_string(),
                reason: err.to_string(),
            }
        } else {
            FeedError::Transport {
                ticker: ticker.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Returns true if the next poll may reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::Transport { .. } | FeedError::Timeout { .. } | FeedError::RateLimited { .. }
        ) || matches!(self, FeedError::Http { status, .. } if *status >= 500)
    }
}

//! Error types for the sync engine.

use feedsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A failure reported by a fetch provider.
///
/// Timeouts and transport failures are both fetch errors; the engine treats
/// them uniformly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch failed: {message}")]
pub struct FetchError {
    /// Error message.
    pub message: String,
    /// Whether the fetch may succeed if repeated.
    pub retryable: bool,
}

impl FetchError {
    /// Creates a retryable fetch error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable fetch error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a timeout error.
    pub fn timeout() -> Self {
        Self::retryable("request timed out")
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The fetch provider failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A window or cursor was misused.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The operation was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The active session changed while the fetch was in flight.
    #[error("session changed during fetch")]
    StaleContext,

    /// An external monitor reported the source is near its rate limit.
    #[error("rate limited")]
    RateLimited,

    /// Polling stopped after too many consecutive failures.
    #[error("polling halted after {attempts} failed attempts")]
    RetryBudgetExhausted {
        /// Number of failed attempts.
        attempts: u32,
    },

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(err) => err.retryable,
            SyncError::RateLimited => true,
            _ => false,
        }
    }

    /// Returns true for conditions that resolve to "no visible change"
    /// rather than an error state.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            SyncError::Cancelled | SyncError::StaleContext | SyncError::RateLimited
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::from(FetchError::retryable("connection lost")).is_retryable());
        assert!(!SyncError::from(FetchError::fatal("forbidden")).is_retryable());
        assert!(SyncError::from(FetchError::timeout()).is_retryable());
        assert!(SyncError::RateLimited.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn silent_errors() {
        assert!(SyncError::Cancelled.is_silent());
        assert!(SyncError::StaleContext.is_silent());
        assert!(SyncError::RateLimited.is_silent());
        assert!(!SyncError::from(FetchError::timeout()).is_silent());
        assert!(!SyncError::RetryBudgetExhausted { attempts: 5 }.is_silent());
    }

    #[test]
    fn error_display() {
        let err = SyncError::from(FetchError::retryable("502 bad gateway"));
        assert_eq!(err.to_string(), "fetch failed: 502 bad gateway");

        let err = SyncError::RetryBudgetExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "polling halted after 5 failed attempts");

        let err = SyncError::from(ProtocolError::IncompatibleVariant {
            current: "link".into(),
            incoming: "derived".into(),
        });
        assert!(err.to_string().starts_with("protocol error"));
    }
}

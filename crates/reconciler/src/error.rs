//! Error types for the reconciler crate.

use thiserror::Error;

use crate::types::RecordKey;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// Every variant is handed back to the scheduler; none is swallowed.
#[derive(Debug, Error)]
pub enum Error {
    /// A remote issue call failed.
    #[error("remote issue call failed: {0}")]
    Remote(#[from] ghissue_github::Error),

    /// The store has no record under the key being written.
    #[error("record '{key}' not found")]
    RecordNotFound { key: RecordKey },

    /// The record changed since it was read.
    #[error("record '{key}' was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        key: RecordKey,
        expected: u64,
        found: u64,
    },

    /// Any other store failure.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// The closing protocol ran without a resolved remote issue.
    ///
    /// This is a logic defect in the caller, not a transient condition.
    #[error("cannot close remote issue for '{key}': no remote issue was resolved")]
    MissingRemoteIssue { key: RecordKey },

    /// A reconcile pass exceeded its deadline.
    #[error("reconcile of '{key}' timed out after {timeout_ms}ms")]
    Timeout { key: RecordKey, timeout_ms: u64 },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The controller loop was stopped.
    #[error("reconciliation loop stopped")]
    LoopStopped,
}

impl Error {
    /// Create a record not found error.
    pub fn record_not_found(key: RecordKey) -> Self {
        Self::RecordNotFound { key }
    }

    /// Create a conflict error.
    pub fn conflict(key: RecordKey, expected: u64, found: u64) -> Self {
        Self::Conflict {
            key,
            expected,
            found,
        }
    }

    /// Create a store error.
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    /// Create a missing remote issue error.
    pub fn missing_remote_issue(key: RecordKey) -> Self {
        Self::MissingRemoteIssue { key }
    }

    /// Create a timeout error.
    pub fn timeout(key: RecordKey, timeout_ms: u64) -> Self {
        Self::Timeout { key, timeout_ms }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether a later pass could succeed without a code change.
    ///
    /// Tracker errors defer to [`ghissue_github::Error::is_retryable`].
    /// [`Error::MissingRemoteIssue`] and [`Error::InvalidConfig`] are defects.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_retryable(),
            Self::MissingRemoteIssue { .. } | Self::InvalidConfig { .. } => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RecordKey {
        RecordKey::new("default", "t1")
    }

    #[test]
    fn test_error_display() {
        let err = Error::conflict(key(), 3, 4);
        let message = err.to_string();
        assert!(message.contains("default/t1"));
        assert!(message.contains("expected version 3"));
    }

    #[test]
    fn test_remote_error_wraps_source() {
        let err = Error::from(ghissue_github::Error::api(500, "boom"));
        assert!(err.to_string().contains("500"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_rejected_request_is_not_transient() {
        assert!(!Error::from(ghissue_github::Error::api(422, "Validation Failed")).is_transient());
        assert!(Error::from(ghissue_github::Error::api(429, "slow down")).is_transient());
    }

    #[test]
    fn test_misuse_is_not_transient() {
        assert!(!Error::missing_remote_issue(key()).is_transient());
        assert!(Error::timeout(key(), 100).is_transient());
    }
}

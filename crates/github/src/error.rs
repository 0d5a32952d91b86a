//! Error types for the issue tracker client.

use thiserror::Error;

/// Result type for issue tracker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by an [`IssueService`](crate::IssueService).
///
/// Clients report these verbatim; retry policy belongs to whoever drives the
/// reconciler.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or connection failure from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The tracker answered with a non-success status.
    #[error("issue tracker returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The tracker answered with a payload that could not be decoded.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// A repository coordinate did not match `owner/repo`.
    #[error("invalid repository coordinate '{value}': expected owner/repo")]
    InvalidRepo { value: String },

    /// Client configuration error.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The addressed issue does not exist in the repository.
    #[error("issue #{number} not found in {repo}")]
    NotFound { repo: String, number: u64 },

    /// A failure injected into the in-memory double.
    #[error("injected failure during {operation}")]
    Injected { operation: String },

    /// URL parse error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Create an API status error.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Create an invalid repository coordinate error.
    pub fn invalid_repo(value: impl Into<String>) -> Self {
        Self::InvalidRepo {
            value: value.into(),
        }
    }

    /// Create a config error.
    pub fn config_error(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(repo: impl Into<String>, number: u64) -> Self {
        Self::NotFound {
            repo: repo.into(),
            number,
        }
    }

    /// Create an injected failure.
    pub fn injected(operation: impl Into<String>) -> Self {
        Self::Injected {
            operation: operation.into(),
        }
    }

    /// Whether a later attempt could plausibly succeed.
    ///
    /// Transport failures, rate limiting and server errors are transient.
    /// Injected failures count as transient so tests can exercise retries.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Injected { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

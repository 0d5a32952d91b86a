//! Error types for the operator binary's library half.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for operator setup.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration and manifests.
#[derive(Debug, Error)]
pub enum Error {
    /// A file could not be read or opened.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`OperatorConfig`](crate::OperatorConfig).
    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Manifest is not valid YAML for the record schema.
    #[error("invalid manifest {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Manifest parsed but declares something unusable.
    #[error("invalid manifest: {reason}")]
    Manifest { reason: String },

    /// A setting is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Issue client setup failed.
    #[error(transparent)]
    Github(#[from] ghissue_github::Error),

    /// Store or controller failure.
    #[error(transparent)]
    Reconciler(#[from] ghissue_reconciler::Error),
}

impl Error {
    /// Create an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a manifest error.
    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::Manifest {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

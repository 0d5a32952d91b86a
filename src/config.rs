//! Operator configuration: TOML file, then environment, then CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ghissue_github::GithubConfig;
use ghissue_reconciler::ControllerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Log filter override.
pub const LOG_ENV: &str = "GHISSUE_LOG";
/// Log file override.
pub const LOG_FILE_ENV: &str = "GHISSUE_LOG_FILE";
/// Worker count override.
pub const WORKERS_ENV: &str = "GHISSUE_WORKERS";

/// Top-level configuration of the operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Issue tracker client.
    pub github: GithubConfig,
    /// Work queue and workers.
    pub controller: ControllerConfig,
    /// Log sink.
    pub logging: LoggingConfig,
    /// Manifest polling.
    pub manifest: ManifestConfig,
}

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
    /// Colorize stderr output. Always off for files.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
            ansi: true,
        }
    }
}

/// Manifest source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// How often the manifest is re-read.
    #[serde(with = "ghissue_github::config::duration_secs")]
    pub poll_interval: Duration,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl OperatorConfig {
    /// Load from an optional TOML file, then overlay the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env(|key| std::env::var(key).ok())
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        toml::from_str(&content).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment values onto this config.
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.github = self.github.merge_env(&lookup);

        if let Some(filter) = lookup(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.logging.filter = filter;
        }
        if let Some(file) = lookup(LOG_FILE_ENV).filter(|v| !v.trim().is_empty()) {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Some(workers) = lookup(WORKERS_ENV) {
            self.controller.workers = workers.trim().parse().map_err(|_| {
                Error::invalid_config(format!("{WORKERS_ENV} must be a positive integer, got '{workers}'"))
            })?;
        }

        Ok(self)
    }

    /// Override the worker count from the command line.
    #[must_use]
    pub const fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(workers) = workers {
            self.controller.workers = workers;
        }
        self
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.github.validate()?;
        self.controller.validate()?;
        if self.manifest.poll_interval.is_zero() {
            return Err(Error::invalid_config("manifest.poll_interval must be positive"));
        }
        Ok(())
    }
}

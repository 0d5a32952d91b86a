//! Configuration for the GitHub issue client.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
/// Fallback token variable.
pub const LEGACY_TOKEN_ENV: &str = "TOKEN";
/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "GITHUB_API_URL";
/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com/";

/// Configuration for the [`GithubClient`](crate::GithubClient).
///
/// The token is never serialized; it only enters through the environment
/// or [`GithubConfig::with_token`].
#[derive(Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token.
    #[serde(skip)]
    pub token: Option<String>,

    /// Per-request timeout.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,

    /// `User-Agent` header value. The API rejects requests without one.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page size used when listing issues.
    #[serde(default = "default_per_page")]
    pub per_page: u8,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            per_page: default_per_page(),
        }
    }
}

impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("per_page", &self.per_page)
            .finish()
    }
}

impl GithubConfig {
    /// Create a config pointing at a different API base URL.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the listing page size.
    #[must_use]
    pub const fn per_page(mut self, per_page: u8) -> Self {
        self.per_page = per_page;
        self
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// Overlay environment values onto this config.
    ///
    /// `lookup` resolves a variable name; tests pass a map-backed closure.
    #[must_use]
    pub fn merge_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }

        let token = lookup(TOKEN_ENV)
            .or_else(|| lookup(LEGACY_TOKEN_ENV))
            .filter(|t| !t.trim().is_empty());
        if token.is_some() {
            self.token = token;
        }

        self
    }

    /// Parse the base URL, normalized to end in `/` so relative joins
    /// stay under it.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)?;
        if url.cannot_be_a_base() {
            return Err(Error::config_error(format!(
                "API URL '{}' cannot be used as a base",
                self.api_url
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Check the settings that would otherwise fail on first use.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.user_agent.trim().is_empty() {
            return Err(Error::config_error("user agent must not be empty"));
        }
        if self.per_page == 0 || self.per_page > 100 {
            return Err(Error::config_error(format!(
                "per_page must be between 1 and 100, got {}",
                self.per_page
            )));
        }
        Ok(())
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("ghissue-operator/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_per_page() -> u8 {
    100
}

/// Serde helper for `Duration` fields written as whole seconds.
///
/// Shared by every configuration section of the operator.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = GithubConfig::default();
        assert_eq!(config.api_url, "https://api.github.com/");
        assert!(config.token.is_none());
        assert_eq!(config.per_page, 100);
        assert!(config.user_agent.starts_with("ghissue-operator/"));
    }

    #[test]
    fn test_merge_env_prefers_github_token() {
        let vars = env(&[("GITHUB_TOKEN", "primary"), ("TOKEN", "legacy")]);
        let config = GithubConfig::default().merge_env(|k| vars.get(k).cloned());
        assert_eq!(config.token.as_deref(), Some("primary"));
    }

    #[test]
    fn test_merge_env_falls_back_to_legacy_token() {
        let vars = env(&[("TOKEN", "legacy"), ("GITHUB_API_URL", "http://localhost:9999/api/v3")]);
        let config = GithubConfig::default().merge_env(|k| vars.get(k).cloned());
        assert_eq!(config.token.as_deref(), Some("legacy"));
        assert_eq!(config.api_url, "http://localhost:9999/api/v3");
    }

    #[test]
    fn test_base_url_appends_trailing_slash() {
        let config = GithubConfig::with_api_url("http://localhost:9999/api/v3");
        assert_eq!(
            config.base_url().ok().map(|u| u.to_string()),
            Some("http://localhost:9999/api/v3/".to_string())
        );
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        let config = GithubConfig::with_api_url("not a url");
        assert!(matches!(config.base_url(), Err(Error::UrlParse(_))));
    }

    #[test]
    fn test_validate_rejects_bad_page_size() {
        let result = GithubConfig::default().per_page(0).validate();
        assert!(matches!(result, Err(Error::Config { .. })));
        assert!(GithubConfig::default().validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = GithubConfig::default().with_token("ghp_secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_token_is_not_serialized() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = GithubConfig::default().with_token("ghp_secret");
        let rendered = toml::to_string(&config)?;
        assert!(!rendered.contains("ghp_secret"));
        Ok(())
    }
}

//! Issue tracker domain types.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static REPO_PATTERN: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+(?:-[a-zA-Z0-9]+)*/[a-zA-Z0-9._-]+$"));

/// An `owner/repo` repository coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoCoordinate {
    owner: String,
    name: String,
}

impl RepoCoordinate {
    /// Parse and validate an `owner/repo` coordinate.
    pub fn parse(value: &str) -> Result<Self> {
        let pattern = REPO_PATTERN
            .as_ref()
            .map_err(|e| Error::config_error(format!("repository pattern: {e}")))?;

        if !pattern.is_match(value) {
            return Err(Error::invalid_repo(value));
        }

        value
            .split_once('/')
            .map(|(owner, name)| Self {
                owner: owner.to_string(),
                name: name.to_string(),
            })
            .ok_or_else(|| Error::invalid_repo(value))
    }

    /// Repository owner (user or organization).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoCoordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepoCoordinate {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RepoCoordinate> for String {
    fn from(value: RepoCoordinate) -> Self {
        value.to_string()
    }
}

/// Open/closed state of a remote issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
}

impl IssueState {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue as observed on the tracker.
///
/// Never cached across reconcile passes; identity is re-resolved every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIssue {
    /// Tracker-assigned issue number.
    pub number: u64,
    pub title: String,
    /// Issue body. A `null` body on the wire reads as empty.
    #[serde(default, deserialize_with = "nullable_string")]
    pub body: String,
    pub state: IssueState,
    pub updated_at: DateTime<Utc>,
}

impl RemoteIssue {
    /// `updated_at` in the tracker's own encoding (`2024-05-01T12:00:00Z`).
    pub fn updated_at_string(&self) -> String {
        self.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Whether the issue is closed.
    pub fn is_closed(&self) -> bool {
        self.state == IssueState::Closed
    }
}

fn nullable_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_coordinate() {
        let repo = RepoCoordinate::parse("octo-org/hello.world_rs");
        assert!(repo.is_ok());
        let repo = repo.ok();
        assert_eq!(repo.as_ref().map(RepoCoordinate::owner), Some("octo-org"));
        assert_eq!(repo.as_ref().map(RepoCoordinate::name), Some("hello.world_rs"));
        assert_eq!(
            repo.map(|r| r.to_string()),
            Some("octo-org/hello.world_rs".to_string())
        );
    }

    #[test]
    fn test_reject_malformed_repo_coordinates() {
        for value in ["", "owner", "owner/", "/repo", "o/r/extra", "ow ner/repo", "a--b/repo"] {
            let result = RepoCoordinate::parse(value);
            assert!(
                matches!(result, Err(Error::InvalidRepo { .. })),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn test_repo_coordinate_serde_validates() {
        let ok: std::result::Result<RepoCoordinate, _> = serde_json::from_str("\"o/r\"");
        assert!(ok.is_ok());

        let bad: std::result::Result<RepoCoordinate, _> = serde_json::from_str("\"not a repo\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_remote_issue_null_body() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let issue: RemoteIssue = serde_json::from_value(serde_json::json!({
            "number": 7,
            "title": "T1",
            "body": null,
            "state": "closed",
            "updated_at": "2024-05-01T12:00:00Z"
        }))?;

        assert_eq!(issue.body, "");
        assert!(issue.is_closed());
        assert_eq!(issue.updated_at_string(), "2024-05-01T12:00:00Z");
        Ok(())
    }

    #[test]
    fn test_issue_state_display() {
        assert_eq!(IssueState::Open.to_string(), "open");
        assert_eq!(IssueState::Closed.to_string(), "closed");
    }
}

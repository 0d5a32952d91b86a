//! Core types for the reconciler.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use ghissue_github::RepoCoordinate;
use serde::{Deserialize, Serialize};

/// Namespace given to records declared without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Stable identifier of a desired record (namespace + name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub namespace: String,
    pub name: String,
}

impl RecordKey {
    /// Create a key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Desired state of a remote issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Intended issue title. Also the key used to find the issue again.
    pub title: String,
    /// Target repository, validated on deserialization.
    pub repo: RepoCoordinate,
    /// Intended issue body.
    pub description: String,
}

impl RecordSpec {
    /// Create a spec.
    pub fn new(title: impl Into<String>, repo: RepoCoordinate, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            repo,
            description: description.into(),
        }
    }
}

/// Observed state mirrored from the remote issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatus {
    /// `open` or `closed`; empty until the first successful pass.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    /// The remote issue's last update instant.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_update_timestamp: String,
}

/// Store-managed metadata of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    pub key: RecordKey,
    /// Markers that block the store from purging the record.
    #[serde(default)]
    pub finalizers: BTreeSet<String>,
    /// Set by the store once deletion has been requested.
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every stored change.
    #[serde(default)]
    pub resource_version: u64,
}

impl RecordMeta {
    /// Metadata for a record not yet stored.
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            finalizers: BTreeSet::new(),
            deletion_timestamp: None,
            resource_version: 0,
        }
    }

    /// Whether the store has marked the record for removal.
    pub const fn is_deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Whether `finalizer` is present.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.contains(finalizer)
    }

    /// Add `finalizer`; returns whether the set changed.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        self.finalizers.insert(finalizer.to_string())
    }

    /// Remove `finalizer`; returns whether the set changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        self.finalizers.remove(finalizer)
    }
}

/// A desired issue record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRecord {
    pub metadata: RecordMeta,
    pub spec: RecordSpec,
    #[serde(default)]
    pub status: RecordStatus,
}

impl DesiredRecord {
    /// A fresh record with empty status and no finalizers.
    pub fn new(key: RecordKey, spec: RecordSpec) -> Self {
        Self {
            metadata: RecordMeta::new(key),
            spec,
            status: RecordStatus::default(),
        }
    }

    /// The record's key.
    pub const fn key(&self) -> &RecordKey {
        &self.metadata.key
    }

    /// Whether deletion has been requested.
    pub const fn is_deletion_requested(&self) -> bool {
        self.metadata.is_deletion_requested()
    }
}

/// Remote action chosen for one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Open a new issue.
    Create { title: String, body: String },
    /// Replace the body of a matched issue.
    UpdateBody { number: u64, body: String },
    /// Matched issue already converged; only observe it.
    Observe { number: u64 },
    /// Close a matched open issue, then release the record.
    Close { number: u64 },
    /// Release the record without a remote call. `number` is the matched
    /// issue when it was already closed.
    Release { number: Option<u64> },
}

impl ReconcileAction {
    /// Whether the action mutates the remote tracker.
    pub const fn is_remote_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::UpdateBody { .. } | Self::Close { .. }
        )
    }

    /// Get a description of the action.
    pub fn description(&self) -> String {
        match self {
            Self::Create { title, .. } => format!("create issue '{title}'"),
            Self::UpdateBody { number, body } => {
                format!("update body of #{number} ({} bytes)", body.len())
            }
            Self::Observe { number } => format!("observe #{number}"),
            Self::Close { number } => format!("close #{number} and release"),
            Self::Release { number: Some(number) } => {
                format!("release (#{number} already closed)")
            }
            Self::Release { number: None } => "release (no remote issue)".to_string(),
        }
    }
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record is gone from the store; nothing to do.
    RecordMissing,
    /// The remote issue was brought in line and its state projected into
    /// the record's status.
    Synced { action: ReconcileAction, issue: u64 },
    /// The remote side is closed or absent and the finalizer was released.
    Released { action: ReconcileAction },
}

impl ReconcileOutcome {
    /// The action taken, if the record existed.
    pub const fn action(&self) -> Option<&ReconcileAction> {
        match self {
            Self::RecordMissing => None,
            Self::Synced { action, .. } | Self::Released { action } => Some(action),
        }
    }

    /// Whether the pass made no remote mutation.
    pub fn is_quiescent(&self) -> bool {
        self.action()
            .is_none_or(|action| !action.is_remote_mutation())
    }
}

//! YAML manifest of desired issue records, applied to the record store.
//!
//! ```yaml
//! records:
//!   - name: flaky-ci
//!     spec:
//!       title: Flaky CI on main
//!       repo: octo-org/octo-repo
//!       description: The integration suite times out about once a day.
//!   - namespace: platform
//!     name: upgrade-runners
//!     spec:
//!       title: Upgrade self-hosted runners
//!       repo: octo-org/infra
//!       description: Move runners to the current image.
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ghissue_reconciler::{DEFAULT_NAMESPACE, InMemoryRecordStore, RecordKey, RecordSpec};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub records: Vec<ManifestRecord>,
}

/// One declared record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub spec: RecordSpec,
}

impl ManifestRecord {
    /// Store key, defaulting the namespace.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(
            self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
            self.name.as_str(),
        )
    }
}

impl Manifest {
    /// Read and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let manifest: Self = serde_yaml::from_str(&content).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate manifest text.
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(content).map_err(|e| Error::manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject empty names and keys declared twice.
    pub fn validate(&self) -> Result<()> {
        if let Some(record) = self.records.iter().find(|r| {
            r.name.trim().is_empty() || r.namespace.as_deref().is_some_and(|ns| ns.trim().is_empty())
        }) {
            return Err(Error::manifest(format!(
                "record '{}' has an empty name or namespace",
                record.key()
            )));
        }

        let duplicates: Vec<String> = self
            .records
            .iter()
            .map(ManifestRecord::key)
            .duplicates()
            .map(|key| key.to_string())
            .collect();
        if !duplicates.is_empty() {
            return Err(Error::manifest(format!(
                "duplicate record keys: {}",
                duplicates.join(", ")
            )));
        }
        Ok(())
    }

    /// Keys of every declared record.
    pub fn keys(&self) -> HashSet<RecordKey> {
        self.records.iter().map(ManifestRecord::key).collect()
    }
}

/// Counts from one manifest sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records created or re-applied.
    pub applied: usize,
    /// Records whose deletion was requested.
    pub deleted: usize,
}

/// Feeds a manifest file into the record store.
///
/// Records dropped from the manifest since the previous sync get a deletion
/// request, so their remote issues are closed before they disappear.
pub struct ManifestSync {
    store: Arc<InMemoryRecordStore>,
    path: PathBuf,
    known: HashSet<RecordKey>,
}

impl ManifestSync {
    /// Create a sync for the manifest at `path`.
    pub fn new(store: Arc<InMemoryRecordStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
            known: HashSet::new(),
        }
    }

    /// Manifest location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the manifest and apply it.
    ///
    /// An unreadable or invalid manifest changes nothing.
    pub async fn sync(&mut self) -> Result<SyncReport> {
        let manifest = Manifest::load(&self.path)?;
        self.apply(manifest).await
    }

    /// Apply an already parsed manifest.
    pub async fn apply(&mut self, manifest: Manifest) -> Result<SyncReport> {
        manifest.validate()?;
        let declared = manifest.keys();
        let mut report = SyncReport::default();

        for record in manifest.records {
            let key = record.key();
            self.store.apply(key, record.spec).await?;
            report.applied = report.applied.saturating_add(1);
        }

        for key in self.known.difference(&declared).sorted() {
            if self.store.request_deletion(key).await {
                debug!(key = %key, "Record removed from manifest");
                report.deleted = report.deleted.saturating_add(1);
            }
        }

        self.known = declared;
        info!(
            path = %self.path.display(),
            applied = report.applied,
            deleted = report.deleted,
            "Manifest synced"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use ghissue_reconciler::RecordStore;

    use super::*;

    const MANIFEST: &str = r"
records:
  - name: t1
    spec:
      title: T1
      repo: o/r
      description: d1
  - namespace: ops
    name: t2
    spec:
      title: T2
      repo: o/r
      description: d2
";

    #[test]
    fn test_parse_defaults_namespace() -> Result<()> {
        let manifest = Manifest::parse(MANIFEST)?;
        let keys = manifest.keys();
        assert!(keys.contains(&RecordKey::new("default", "t1")));
        assert!(keys.contains(&RecordKey::new("ops", "t2")));
        Ok(())
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        let doubled = format!("{MANIFEST}  - name: t1\n    spec: {{ title: X, repo: o/r, description: x }}\n");
        let result = Manifest::parse(&doubled);
        assert!(matches!(result, Err(Error::Manifest { reason }) if reason.contains("default/t1")));
    }

    #[test]
    fn test_parse_rejects_invalid_repo() {
        let bad = "records:\n  - name: t1\n    spec: { title: T1, repo: not-a-repo, description: d1 }\n";
        assert!(Manifest::parse(bad).is_err());
    }

    #[test]
    fn test_parse_rejects_empty_name() {
        let bad = "records:\n  - name: ' '\n    spec: { title: T1, repo: o/r, description: d1 }\n";
        assert!(matches!(Manifest::parse(bad), Err(Error::Manifest { .. })));
    }

    #[tokio::test]
    async fn test_sync_requests_deletion_of_removed_records() -> Result<()> {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut sync = ManifestSync::new(store.clone(), "unused.yaml");

        let first = sync.apply(Manifest::parse(MANIFEST)?).await?;
        assert_eq!(first, SyncReport { applied: 2, deleted: 0 });

        let mut fewer = Manifest::parse(MANIFEST)?;
        fewer.records.retain(|r| r.name == "t1");
        let second = sync.apply(fewer).await?;

        assert_eq!(second, SyncReport { applied: 1, deleted: 1 });
        assert_eq!(store.keys().await?, vec![RecordKey::new("default", "t1")]);
        Ok(())
    }
}

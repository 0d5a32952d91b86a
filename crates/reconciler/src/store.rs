//! Desired-state store trait and the in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{DesiredRecord, RecordKey, RecordSpec};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Storage of desired records, as seen by the reconciler.
///
/// Both update methods use optimistic concurrency: the caller's
/// `resource_version` must match the stored one, otherwise
/// [`Error::Conflict`] is returned. Updates return the stored record, whose
/// version the caller must use for any further write.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record. `None` when it does not exist.
    async fn get(&self, key: &RecordKey) -> Result<Option<DesiredRecord>>;

    /// Persist spec and finalizer changes. Status is ignored.
    ///
    /// A record whose deletion was requested is purged once its finalizer
    /// set becomes empty.
    async fn update_metadata(&self, record: &DesiredRecord) -> Result<DesiredRecord>;

    /// Persist only the status sub-resource.
    async fn update_status(&self, record: &DesiredRecord) -> Result<DesiredRecord>;

    /// Keys of every stored record.
    async fn keys(&self) -> Result<Vec<RecordKey>>;
}

/// In-memory record store with change notifications.
///
/// Writes that change nothing keep the version and emit no notification, so
/// a converged reconcile pass does not trigger another one.
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordKey, DesiredRecord>>,
    changes: broadcast::Sender<RecordKey>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            changes,
        }
    }
}

impl InMemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to keys of changed records.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordKey> {
        self.changes.subscribe()
    }

    /// Create a record or replace its spec.
    pub async fn apply(&self, key: RecordKey, spec: RecordSpec) -> Result<DesiredRecord> {
        if key.name.trim().is_empty() || key.namespace.trim().is_empty() {
            return Err(Error::store(format!("record key '{key}' has an empty segment")));
        }

        let mut records = self.records.write().await;
        let stored = match records.get_mut(&key) {
            Some(existing) if existing.spec == spec => return Ok(existing.clone()),
            Some(existing) => {
                existing.spec = spec;
                bump(existing);
                existing.clone()
            }
            None => {
                let mut record = DesiredRecord::new(key.clone(), spec);
                bump(&mut record);
                records.insert(key.clone(), record.clone());
                record
            }
        };
        drop(records);

        debug!(key = %key, version = stored.metadata.resource_version, "Applied record");
        self.notify(key);
        Ok(stored)
    }

    /// Mark a record for deletion.
    ///
    /// Records without finalizers are purged at once. Returns `false` when
    /// no such record exists.
    pub async fn request_deletion(&self, key: &RecordKey) -> bool {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(key) else {
            return false;
        };

        if record.metadata.finalizers.is_empty() {
            records.remove(key);
            debug!(key = %key, "Purged record without finalizers");
        } else if record.metadata.deletion_timestamp.is_none() {
            record.metadata.deletion_timestamp = Some(Utc::now());
            bump(record);
            debug!(key = %key, "Deletion requested");
        } else {
            return true;
        }
        drop(records);

        self.notify(key.clone());
        true
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn notify(&self, key: RecordKey) {
        // No subscribers is fine.
        let _ = self.changes.send(key);
    }
}

fn bump(record: &mut DesiredRecord) {
    record.metadata.resource_version = record.metadata.resource_version.saturating_add(1);
}

fn check_version(stored: &DesiredRecord, incoming: &DesiredRecord) -> Result<()> {
    let expected = incoming.metadata.resource_version;
    let found = stored.metadata.resource_version;
    if expected == found {
        Ok(())
    } else {
        Err(Error::conflict(incoming.key().clone(), expected, found))
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<DesiredRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn update_metadata(&self, record: &DesiredRecord) -> Result<DesiredRecord> {
        let key = record.key().clone();
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&key)
            .ok_or_else(|| Error::record_not_found(key.clone()))?;
        check_version(stored, record)?;

        if stored.spec == record.spec && stored.metadata.finalizers == record.metadata.finalizers {
            return Ok(stored.clone());
        }

        stored.spec = record.spec.clone();
        stored.metadata.finalizers = record.metadata.finalizers.clone();
        bump(stored);
        let updated = stored.clone();

        if updated.is_deletion_requested() && updated.metadata.finalizers.is_empty() {
            records.remove(&key);
            debug!(key = %key, "Purged record after last finalizer was released");
        }
        drop(records);

        self.notify(key);
        Ok(updated)
    }

    async fn update_status(&self, record: &DesiredRecord) -> Result<DesiredRecord> {
        let key = record.key().clone();
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&key)
            .ok_or_else(|| Error::record_not_found(key.clone()))?;
        check_version(stored, record)?;

        if stored.status == record.status {
            return Ok(stored.clone());
        }

        stored.status = record.status.clone();
        bump(stored);
        let updated = stored.clone();
        drop(records);

        self.notify(key);
        Ok(updated)
    }

    async fn keys(&self) -> Result<Vec<RecordKey>> {
        let mut keys: Vec<_> = self.records.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use ghissue_github::RepoCoordinate;

    use super::*;
    use crate::types::RecordStatus;

    const FINALIZER: &str = "example.com/finalizer";

    fn key() -> RecordKey {
        RecordKey::new("default", "t1")
    }

    fn spec(description: &str) -> Result<RecordSpec> {
        Ok(RecordSpec::new("T1", RepoCoordinate::parse("o/r")?, description))
    }

    #[tokio::test]
    async fn test_apply_creates_then_replaces_spec() -> Result<()> {
        let store = InMemoryRecordStore::new();

        let created = store.apply(key(), spec("d1")?).await?;
        let same = store.apply(key(), spec("d1")?).await?;
        let replaced = store.apply(key(), spec("d2")?).await?;

        assert_eq!(created.metadata.resource_version, 1);
        assert_eq!(same.metadata.resource_version, 1);
        assert_eq!(replaced.metadata.resource_version, 2);
        assert_eq!(replaced.spec.description, "d2");
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() -> Result<()> {
        let store = InMemoryRecordStore::new();
        let mut stale = store.apply(key(), spec("d1")?).await?;
        store.apply(key(), spec("d2")?).await?;

        stale.metadata.add_finalizer(FINALIZER);
        let result = store.update_metadata(&stale).await;

        assert!(matches!(
            result,
            Err(Error::Conflict {
                expected: 1,
                found: 2,
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_status_update_ignores_metadata() -> Result<()> {
        let store = InMemoryRecordStore::new();
        let mut record = store.apply(key(), spec("d1")?).await?;

        record.metadata.add_finalizer(FINALIZER);
        record.status = RecordStatus {
            state: "open".to_string(),
            last_update_timestamp: "2024-01-01T00:00:01Z".to_string(),
        };
        let updated = store.update_status(&record).await?;

        assert_eq!(updated.status.state, "open");
        assert!(updated.metadata.finalizers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_deletion_waits_for_finalizers() -> Result<()> {
        let store = InMemoryRecordStore::new();
        let mut record = store.apply(key(), spec("d1")?).await?;
        record.metadata.add_finalizer(FINALIZER);
        store.update_metadata(&record).await?;

        assert!(store.request_deletion(&key()).await);
        let mut pending = store.get(&key()).await?.ok_or_else(|| Error::store("record vanished"))?;
        assert!(pending.is_deletion_requested());

        pending.metadata.remove_finalizer(FINALIZER);
        store.update_metadata(&pending).await?;

        assert!(store.get(&key()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_deletion_without_finalizers_purges() -> Result<()> {
        let store = InMemoryRecordStore::new();
        store.apply(key(), spec("d1")?).await?;

        assert!(store.request_deletion(&key()).await);
        assert!(store.is_empty().await);
        assert!(!store.request_deletion(&key()).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_noop_writes_do_not_notify() -> Result<()> {
        let store = InMemoryRecordStore::new();
        let mut changes = store.subscribe();

        let record = store.apply(key(), spec("d1")?).await?;
        store.update_metadata(&record).await?;
        store.update_status(&record).await?;

        assert_eq!(changes.try_recv().ok(), Some(key()));
        assert!(changes.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_of_missing_record_fails() -> Result<()> {
        let store = InMemoryRecordStore::new();
        let record = DesiredRecord::new(key(), spec("d1")?);
        let result = store.update_status(&record).await;
        assert!(matches!(result, Err(Error::RecordNotFound { .. })));
        Ok(())
    }
}

//! Checkpoint stores: in-memory for tests and demos, JSON files for durability across restarts.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::CheckpointStore;
use crate::errors::PlatformError;
use crate::model::{CheckpointRecord, PartitionId};

type CheckpointKey = (String, PartitionId);

/// Process-local checkpoint store.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    records: DashMap<CheckpointKey, CheckpointRecord>,
    applied: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits that advanced a checkpoint.
    pub fn applied_commits(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn commit(&self, record: &CheckpointRecord) -> Result<(), PlatformError> {
        let key = (record.consumer_group.clone(), record.partition_id.clone());
        match self.records.entry(key) {
            Entry::Occupied(mut slot) => {
                if slot.get().sequence_number >= record.sequence_number {
                    return Ok(());
                }
                slot.insert(record.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(
        &self,
        consumer_group: &str,
        partition_id: &PartitionId,
    ) -> Result<Option<CheckpointRecord>, PlatformError> {
        let key = (consumer_group.to_string(), partition_id.clone());
        Ok(self.records.get(&key).map(|r| r.value().clone()))
    }
}

/// Checkpoint store keeping one JSON document per partition under
/// `<root>/<consumer_group>/<partition>.json`.
///
/// Writes go to a temp file first and are renamed into place, so a reader never
/// observes a half-written record.
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, consumer_group: &str, partition_id: &PartitionId) -> PathBuf {
        self.root
            .join(path_segment(consumer_group))
            .join(format!("{}.json", path_segment(partition_id.as_str())))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<CheckpointRecord>, PlatformError> {
        match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(PlatformError::checkpoint),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PlatformError::checkpoint(err)),
        }
    }
}

fn path_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn commit(&self, record: &CheckpointRecord) -> Result<(), PlatformError> {
        let path = self.record_path(&record.consumer_group, &record.partition_id);
        if let Some(existing) = self.read_record(&path).await?
            && existing.sequence_number >= record.sequence_number
        {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(PlatformError::checkpoint)?;
        }
        let raw = serde_json::to_vec_pretty(record).map_err(PlatformError::checkpoint)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(PlatformError::checkpoint)?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(PlatformError::checkpoint)?;
        debug!(
            event = "checkpoint.persisted",
            domain = "checkpoint",
            consumer_group = %record.consumer_group,
            partition = %record.partition_id,
            sequence_number = record.sequence_number
        );
        Ok(())
    }

    async fn load(
        &self,
        consumer_group: &str,
        partition_id: &PartitionId,
    ) -> Result<Option<CheckpointRecord>, PlatformError> {
        self.read_record(&self.record_path(consumer_group, partition_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(group: &str, partition: &str, sequence_number: u64) -> CheckpointRecord {
        CheckpointRecord {
            consumer_group: group.into(),
            partition_id: PartitionId::from(partition),
            sequence_number,
            committed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_ignores_regressions() {
        let store = InMemoryCheckpointStore::new();
        store.commit(&record("$Default", "0", 9)).await.unwrap();
        store.commit(&record("$Default", "0", 4)).await.unwrap();
        store.commit(&record("$Default", "0", 9)).await.unwrap();

        let loaded = store.load("$Default", &"0".into()).await.unwrap().unwrap();
        assert_eq!(loaded.sequence_number, 9);
        assert_eq!(store.applied_commits(), 1);
    }

    #[tokio::test]
    async fn memory_store_keys_by_group_and_partition() {
        let store = InMemoryCheckpointStore::new();
        store.commit(&record("a", "0", 3)).await.unwrap();
        assert!(store.load("b", &"0".into()).await.unwrap().is_none());
        assert!(store.load("a", &"1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        FileCheckpointStore::new(dir.path())
            .commit(&record("$Default", "1", 19))
            .await
            .unwrap();

        let reopened = FileCheckpointStore::new(dir.path());
        let loaded = reopened.load("$Default", &"1".into()).await.unwrap().unwrap();
        assert_eq!(loaded.sequence_number, 19);
        assert!(dir.path().join("$Default").join("1.json").exists());
    }

    #[tokio::test]
    async fn file_store_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.commit(&record("g", "0", 29)).await.unwrap();
        store.commit(&record("g", "0", 9)).await.unwrap();
        let loaded = store.load("g", &"0".into()).await.unwrap().unwrap();
        assert_eq!(loaded.sequence_number, 29);
    }

    #[tokio::test]
    async fn file_store_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load("g", &"7".into()).await.unwrap().is_none());
    }
}

//! Per-partition count of events consumed since the last successful checkpoint.

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::model::PartitionId;

/// Sharded counter map. Partitions hashing to different shards never contend;
/// updates to one partition are serialized by its shard lock, so no increment is lost.
#[derive(Debug, Default)]
pub struct PartitionProgressTracker {
    counts: DashMap<PartitionId, u64>,
}

impl PartitionProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the partition's counter, creating it at 0 first, and returns the new value.
    pub fn increment(&self, partition_id: &PartitionId) -> u64 {
        if let Some(mut count) = self.counts.get_mut(partition_id) {
            *count += 1;
            return *count;
        }
        let mut count = self.counts.entry(partition_id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Sets the partition's counter back to 0. Call only after a confirmed checkpoint.
    pub fn reset(&self, partition_id: &PartitionId) {
        self.counts.insert(partition_id.clone(), 0);
    }

    pub fn count(&self, partition_id: &PartitionId) -> u64 {
        self.counts.get(partition_id).map_or(0, |c| *c)
    }

    pub fn snapshot(&self) -> BTreeMap<PartitionId, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

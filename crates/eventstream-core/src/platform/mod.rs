//! Contracts of the external streaming platform, plus an in-process implementation.
//!
//! The coordinator only ever talks to these traits. [`InMemoryEventHub`] and the
//! checkpoint stores in [`checkpoint`] are the implementations shipped with the
//! crate; a vendor binding would implement the same traits.

pub mod checkpoint;
pub mod hub;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::PlatformError;
use crate::model::{CheckpointRecord, ConsumedEvent, EventBatch, EventData, PartitionId, SendOptions};

pub use checkpoint::{FileCheckpointStore, InMemoryCheckpointStore};
pub use hub::{InMemoryEventHub, InMemorySubscription};

/// Producer side of the platform.
#[async_trait]
pub trait StreamPublisher: Send + Sync {
    /// Largest batch, in bytes, the platform accepts in one send.
    fn max_batch_bytes(&self) -> usize;

    fn create_batch(&self, options: SendOptions) -> EventBatch {
        EventBatch::new(self.max_batch_bytes(), options)
    }

    /// Sends all events to a single partition chosen from `options`.
    async fn send(&self, events: Vec<EventData>, options: &SendOptions) -> Result<(), PlatformError>;

    async fn send_batch(&self, batch: EventBatch) -> Result<(), PlatformError> {
        if batch.size_in_bytes() > self.max_batch_bytes() {
            return Err(PlatformError::BatchTooLarge {
                size: batch.size_in_bytes(),
                max: self.max_batch_bytes(),
            });
        }
        let (events, options) = batch.into_parts();
        self.send(events, &options).await
    }
}

/// Partition-level failure reported by the platform (lease loss, read errors).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionFailure {
    pub partition_id: PartitionId,
    pub message: String,
}

/// Callbacks installed on a subscription.
///
/// `on_event` may run concurrently for different partitions but is never
/// invoked concurrently for the same partition.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: ConsumedEvent);

    async fn on_error(&self, failure: PartitionFailure);
}

/// Identifies one open subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Consumer side of the platform.
#[async_trait]
pub trait StreamSubscription: Send + Sync {
    /// Starts delivering events to `handler` until the handle is closed.
    async fn open(&self, handler: Arc<dyn EventHandler>) -> Result<SubscriptionHandle, PlatformError>;

    /// Stops delivery and waits for every in-flight handler invocation to finish.
    async fn close(&self, handle: SubscriptionHandle) -> Result<(), PlatformError>;
}

/// Durable storage for partition resume markers.
///
/// Commits are idempotent and monotonic: a record at or below the stored
/// sequence number for the same consumer group and partition is a no-op.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn commit(&self, record: &CheckpointRecord) -> Result<(), PlatformError>;

    async fn load(
        &self,
        consumer_group: &str,
        partition_id: &PartitionId,
    ) -> Result<Option<CheckpointRecord>, PlatformError>;
}

//! In-process event hub: partitioned append-only logs with one delivery worker
//! per partition per open subscription.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    CheckpointStore, EventHandler, PartitionFailure, StreamPublisher, StreamSubscription,
    SubscriptionHandle,
};
use crate::errors::PlatformError;
use crate::model::{ConsumedEvent, EventData, PartitionId, SendOptions};

pub const DEFAULT_PARTITION_COUNT: usize = 2;
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 1024;
pub const DEFAULT_CONSUMER_GROUP: &str = "$Default";

#[derive(Clone)]
struct StoredEvent {
    body: Bytes,
    properties: HashMap<String, String>,
    enqueued_at: DateTime<Utc>,
}

impl StoredEvent {
    fn to_consumed(&self, partition_id: &PartitionId, sequence_number: u64) -> ConsumedEvent {
        ConsumedEvent {
            partition_id: partition_id.clone(),
            sequence_number,
            payload: self.body.clone(),
            attributes: self.properties.clone(),
            received_at: self.enqueued_at,
        }
    }
}

struct PartitionLog {
    id: PartitionId,
    events: RwLock<Vec<StoredEvent>>,
    faults: Mutex<VecDeque<String>>,
    changed: Notify,
}

impl PartitionLog {
    fn new(id: PartitionId) -> Self {
        Self {
            id,
            events: RwLock::new(Vec::new()),
            faults: Mutex::new(VecDeque::new()),
            changed: Notify::new(),
        }
    }
}

struct HubInner {
    name: String,
    partitions: Vec<Arc<PartitionLog>>,
    max_batch_bytes: usize,
    next_partition: AtomicUsize,
}

impl HubInner {
    fn partition(&self, id: &PartitionId) -> Result<&Arc<PartitionLog>, PlatformError> {
        self.partitions
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| PlatformError::UnknownPartition(id.clone()))
    }

    fn route(&self, options: &SendOptions) -> Result<&Arc<PartitionLog>, PlatformError> {
        if let Some(id) = &options.partition_id {
            return self.partition(id);
        }
        let index = match &options.partition_key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.partitions.len() as u64) as usize
            }
            None => self.next_partition.fetch_add(1, Ordering::Relaxed) % self.partitions.len(),
        };
        Ok(&self.partitions[index])
    }
}

/// Event hub living inside the current process. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryEventHub {
    inner: Arc<HubInner>,
}

impl InMemoryEventHub {
    /// Creates a hub with partitions named `"0"` to `"{partition_count - 1}"`.
    pub fn new(name: impl Into<String>, partition_count: usize) -> Self {
        Self::with_max_batch_bytes(name, partition_count, DEFAULT_MAX_BATCH_BYTES)
    }

    pub fn with_max_batch_bytes(
        name: impl Into<String>,
        partition_count: usize,
        max_batch_bytes: usize,
    ) -> Self {
        let partitions = (0..partition_count.max(1))
            .map(|i| Arc::new(PartitionLog::new(PartitionId::new(i.to_string()))))
            .collect();
        Self {
            inner: Arc::new(HubInner {
                name: name.into(),
                partitions,
                max_batch_bytes,
                next_partition: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.inner.partitions.iter().map(|p| p.id.clone()).collect()
    }

    /// Number of events ever appended to `partition_id`.
    pub async fn partition_len(&self, partition_id: &PartitionId) -> Result<usize, PlatformError> {
        Ok(self.inner.partition(partition_id)?.events.read().await.len())
    }

    /// Queues a failure that the partition's delivery workers report through
    /// [`EventHandler::on_error`] before resuming delivery.
    pub async fn inject_partition_fault(
        &self,
        partition_id: &PartitionId,
        message: impl Into<String>,
    ) -> Result<(), PlatformError> {
        let log = self.inner.partition(partition_id)?;
        log.faults.lock().await.push_back(message.into());
        log.changed.notify_waiters();
        Ok(())
    }

    /// Subscription for `consumer_group` starting at the earliest event of every partition.
    pub fn subscriber(&self, consumer_group: impl Into<String>) -> InMemorySubscription {
        InMemorySubscription {
            hub: self.inner.clone(),
            consumer_group: consumer_group.into(),
            checkpoints: None,
            running: DashMap::new(),
        }
    }
}

#[async_trait]
impl StreamPublisher for InMemoryEventHub {
    fn max_batch_bytes(&self) -> usize {
        self.inner.max_batch_bytes
    }

    async fn send(&self, events: Vec<EventData>, options: &SendOptions) -> Result<(), PlatformError> {
        if events.is_empty() {
            return Ok(());
        }
        let log = self.inner.route(options)?;
        let count = events.len();
        let first_sequence = {
            let mut stored = log.events.write().await;
            let first = stored.len();
            let now = Utc::now();
            stored.extend(events.into_iter().map(|e| StoredEvent {
                body: e.body,
                properties: e.properties,
                enqueued_at: now,
            }));
            first
        };
        log.changed.notify_waiters();
        debug!(
            event = "hub.events_appended",
            domain = "platform",
            hub = %self.inner.name,
            partition = %log.id,
            count = count as u64,
            first_sequence = first_sequence as u64
        );
        Ok(())
    }
}

struct RunningSubscription {
    stop: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

/// Consumer-group view of an [`InMemoryEventHub`].
///
/// With a checkpoint store attached, each partition resumes right after its
/// last committed sequence number; otherwise delivery starts at the earliest event.
pub struct InMemorySubscription {
    hub: Arc<HubInner>,
    consumer_group: String,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    running: DashMap<SubscriptionHandle, RunningSubscription>,
}

impl InMemorySubscription {
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    async fn start_position(&self, partition_id: &PartitionId) -> Result<usize, PlatformError> {
        let Some(store) = &self.checkpoints else {
            return Ok(0);
        };
        let record = store.load(&self.consumer_group, partition_id).await?;
        Ok(record.map_or(0, |r| r.sequence_number as usize + 1))
    }
}

#[async_trait]
impl StreamSubscription for InMemorySubscription {
    async fn open(&self, handler: Arc<dyn EventHandler>) -> Result<SubscriptionHandle, PlatformError> {
        let mut starts = Vec::with_capacity(self.hub.partitions.len());
        for log in &self.hub.partitions {
            starts.push(self.start_position(&log.id).await?);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let workers = self
            .hub
            .partitions
            .iter()
            .zip(starts)
            .map(|(log, start)| {
                tokio::spawn(deliver_partition(
                    log.clone(),
                    start,
                    handler.clone(),
                    stop_rx.clone(),
                ))
            })
            .collect();

        let handle = SubscriptionHandle::new();
        self.running.insert(
            handle,
            RunningSubscription {
                stop: stop_tx,
                workers,
            },
        );
        info!(
            event = "subscription.opened",
            domain = "platform",
            hub = %self.hub.name,
            consumer_group = %self.consumer_group,
            subscription = %handle,
            partitions = self.hub.partitions.len() as u64
        );
        Ok(handle)
    }

    async fn close(&self, handle: SubscriptionHandle) -> Result<(), PlatformError> {
        let (_, running) = self.running.remove(&handle).ok_or_else(|| {
            PlatformError::Subscription(format!("unknown subscription handle {handle}"))
        })?;
        let _ = running.stop.send(true);

        let mut failures = Vec::new();
        for joined in futures::future::join_all(running.workers).await {
            if let Err(err) = joined {
                failures.push(err.to_string());
            }
        }
        info!(
            event = "subscription.closed",
            domain = "platform",
            hub = %self.hub.name,
            consumer_group = %self.consumer_group,
            subscription = %handle,
            failed_workers = failures.len() as u64
        );
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::Subscription(format!(
                "partition worker failed: {}",
                failures.join("; ")
            )))
        }
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        for entry in self.running.iter() {
            let _ = entry.value().stop.send(true);
        }
    }
}

async fn deliver_partition(
    log: Arc<PartitionLog>,
    start: usize,
    handler: Arc<dyn EventHandler>,
    mut stop: watch::Receiver<bool>,
) {
    let mut next = start;
    loop {
        if *stop.borrow() {
            break;
        }
        // Registered before inspecting the log so an append in between still wakes us.
        let changed = log.changed.notified();
        tokio::pin!(changed);

        let fault = log.faults.lock().await.pop_front();
        if let Some(message) = fault {
            warn!(
                event = "partition.fault",
                domain = "platform",
                partition = %log.id,
                message = %message
            );
            handler
                .on_error(PartitionFailure {
                    partition_id: log.id.clone(),
                    message,
                })
                .await;
            continue;
        }

        let pending = log
            .events
            .read()
            .await
            .get(next)
            .map(|stored| stored.to_consumed(&log.id, next as u64));
        if let Some(event) = pending {
            handler.on_event(event).await;
            next += 1;
            continue;
        }

        tokio::select! {
            _ = &mut changed => {}
            stopped = stop.changed() => {
                if stopped.is_err() {
                    break;
                }
            }
        }
    }
    debug!(
        event = "partition.worker_stopped",
        domain = "platform",
        partition = %log.id,
        next_sequence = next as u64
    );
}

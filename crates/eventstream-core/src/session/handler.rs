use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Checkpointing;
use crate::format::EventFormatter;
use crate::model::{CheckpointRecord, ConsumedEvent};
use crate::platform::{EventHandler, PartitionFailure};
use crate::sink::ResultSink;
use crate::tracker::PartitionProgressTracker;

/// Handlers a session installs on its subscription.
pub(crate) struct ConsumptionHandler {
    pub(crate) sink: Arc<ResultSink>,
    pub(crate) tracker: Arc<PartitionProgressTracker>,
    pub(crate) formatter: Arc<dyn EventFormatter>,
    pub(crate) checkpointing: Option<Checkpointing>,
}

impl ConsumptionHandler {
    fn record_event(&self, event: &ConsumedEvent) {
        match self.formatter.format(event) {
            Ok(line) => self.sink.append(line),
            Err(err) => {
                warn!(
                    event = "session.event_failed",
                    domain = "consume",
                    partition = %event.partition_id,
                    sequence_number = event.sequence_number,
                    error = %err
                );
                self.sink.append(format!(
                    "Exception: {err} when processing event {} on partition '{}'",
                    event.sequence_number, event.partition_id
                ));
            }
        }
    }

    /// Counts the event and commits a checkpoint once the policy says so. The
    /// counter is reset only after the store confirms the commit; on failure it
    /// keeps growing and the next event retries.
    async fn advance_checkpoint(&self, checkpointing: &Checkpointing, event: &ConsumedEvent) {
        let partition = &event.partition_id;
        let count = self.tracker.increment(partition);
        if !checkpointing.policy.should_checkpoint(count) {
            return;
        }

        let record = CheckpointRecord::for_event(&checkpointing.consumer_group, event);
        match checkpointing.store.commit(&record).await {
            Ok(()) => {
                self.tracker.reset(partition);
                debug!(
                    event = "checkpoint.committed",
                    domain = "consume",
                    partition = %partition,
                    sequence_number = event.sequence_number,
                    events_since_last = count
                );
            }
            Err(err) => {
                warn!(
                    event = "checkpoint.commit_failed",
                    domain = "consume",
                    partition = %partition,
                    sequence_number = event.sequence_number,
                    pending = count,
                    error = %err
                );
                self.sink.append(format!(
                    "Partition '{partition}': checkpoint commit failed at sequence {}: {err}",
                    event.sequence_number
                ));
            }
        }
    }
}

#[async_trait]
impl EventHandler for ConsumptionHandler {
    async fn on_event(&self, event: ConsumedEvent) {
        self.record_event(&event);
        if let Some(checkpointing) = &self.checkpointing {
            self.advance_checkpoint(checkpointing, &event).await;
        }
    }

    async fn on_error(&self, failure: PartitionFailure) {
        warn!(
            event = "session.partition_failed",
            domain = "consume",
            partition = %failure.partition_id,
            message = %failure.message
        );
        self.sink.append(format!(
            "Partition '{}': Unhandled exception {}.",
            failure.partition_id, failure.message
        ));
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::PublishError;
use crate::model::{EVENT_TYPE_ATTRIBUTE, EventData, SendOptions};
use crate::platform::StreamPublisher;

pub const EVENT_STREAM_TYPE: &str = "EventStream";

/// Outcome of one burst: how many events were asked for and how many fit in
/// the batch that was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub requested: u64,
    pub sent: u64,
}

impl PublishReport {
    pub fn dropped(&self) -> u64 {
        self.requested - self.sent
    }
}

/// Publishes numbered synthetic events in a single batch.
pub struct EventStreamPublisher {
    publisher: Arc<dyn StreamPublisher>,
}

impl EventStreamPublisher {
    pub fn new(publisher: Arc<dyn StreamPublisher>) -> Self {
        Self { publisher }
    }

    /// Sends `Event Number: 0` to `Event Number: {count - 1}`. Events that do
    /// not fit in the batch are dropped, not sent separately.
    pub async fn send_n_events(&self, count: i64) -> Result<PublishReport, PublishError> {
        if count < 0 {
            return Err(PublishError::InvalidArgument(format!(
                "event count must not be negative, got {count}"
            )));
        }
        let requested = count as u64;
        let mut batch = self.publisher.create_batch(SendOptions::default());
        for number in 0..requested {
            let event = EventData::new(format!("Event Number: {number}"))
                .with_property(EVENT_TYPE_ATTRIBUTE, EVENT_STREAM_TYPE);
            if batch.try_add(event).is_err() {
                error!(
                    event = "publish.batch_full",
                    domain = "publish",
                    number,
                    requested,
                    max_bytes = batch.max_bytes() as u64
                );
                break;
            }
        }

        let report = PublishReport {
            requested,
            sent: batch.len() as u64,
        };
        self.publisher.send_batch(batch).await.map_err(|err| {
            error!(
                event = "publish.send_failed",
                domain = "publish",
                requested,
                error = %err
            );
            PublishError::from(err)
        })?;
        info!(
            event = "publish.batch_sent",
            domain = "publish",
            requested = report.requested,
            sent = report.sent
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PlatformError;
    use crate::model::PartitionId;
    use crate::platform::InMemoryEventHub;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RejectingPublisher {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl StreamPublisher for RejectingPublisher {
        fn max_batch_bytes(&self) -> usize {
            1024
        }

        async fn send(&self, _events: Vec<EventData>, _options: &SendOptions) -> Result<(), PlatformError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::Publish("namespace throttled".into()))
        }
    }

    async fn total_events(hub: &InMemoryEventHub) -> usize {
        let mut total = 0;
        for id in hub.partition_ids() {
            total += hub.partition_len(&id).await.unwrap();
        }
        total
    }

    #[tokio::test]
    async fn sends_all_events_in_one_batch() {
        let hub = InMemoryEventHub::new("hub", 2);
        let publisher = EventStreamPublisher::new(Arc::new(hub.clone()));

        let report = publisher.send_n_events(5).await.unwrap();

        assert_eq!(report, PublishReport { requested: 5, sent: 5 });
        // A batch lands on a single partition.
        let lens = [
            hub.partition_len(&PartitionId::from("0")).await.unwrap(),
            hub.partition_len(&PartitionId::from("1")).await.unwrap(),
        ];
        assert!(lens == [5, 0] || lens == [0, 5]);
    }

    #[tokio::test]
    async fn full_batch_drops_the_remainder() {
        // Each event is "Event Number: N" plus the EventType property and overhead.
        let one_event = EventData::new("Event Number: 0")
            .with_property(EVENT_TYPE_ATTRIBUTE, EVENT_STREAM_TYPE)
            .size_in_bytes();
        let hub = InMemoryEventHub::with_max_batch_bytes("hub", 1, one_event * 3);
        let publisher = EventStreamPublisher::new(Arc::new(hub.clone()));

        let report = publisher.send_n_events(8).await.unwrap();

        assert_eq!(report.sent, 3);
        assert_eq!(report.dropped(), 5);
        assert_eq!(total_events(&hub).await, 3);
    }

    #[tokio::test]
    async fn negative_count_is_rejected_without_sending() {
        let fake = Arc::new(RejectingPublisher {
            sends: AtomicUsize::new(0),
        });
        let publisher = EventStreamPublisher::new(fake.clone());

        let err = publisher.send_n_events(-1).await.unwrap_err();

        assert!(matches!(err, PublishError::InvalidArgument(_)));
        assert_eq!(fake.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn platform_failure_is_returned() {
        let fake = Arc::new(RejectingPublisher {
            sends: AtomicUsize::new(0),
        });
        let publisher = EventStreamPublisher::new(fake.clone());

        let err = publisher.send_n_events(2).await.unwrap_err();

        assert_eq!(
            err,
            PublishError::Platform(PlatformError::Publish("namespace throttled".into()))
        );
        assert_eq!(fake.sends.load(Ordering::SeqCst), 1);
    }
}

//! Wires configuration, the hub, the publishers and both readers together.

use std::sync::Arc;

use eventstream_core::config::{
    CheckpointStorageSettings, HubSettings, ReaderSettings, default_partition,
};
use eventstream_core::{
    BodyFormatter, Checkpointing, ConfigError, EventStreamPublisher, InMemoryEventHub,
    RequestPublisher, StreamConsumptionSession, UserRequest,
};
use tracing::info;

use crate::cli::{RequestArgs, Step};
use crate::handlers::Reply;

/// All four services over one shared hub.
pub struct Services {
    hub: InMemoryEventHub,
    publisher: EventStreamPublisher,
    requests: RequestPublisher,
    reader: StreamConsumptionSession,
    reader_no_checkpoint: StreamConsumptionSession,
}

impl Services {
    /// Fails when the hub or checkpoint storage settings are missing or unusable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let hub_settings = HubSettings::from_lookup(&lookup)?;
        let storage = CheckpointStorageSettings::from_lookup(&lookup)?;
        let reader_settings = ReaderSettings::from_lookup(&lookup);
        let hub = hub_settings.connect()?;
        let store = storage.open();
        let group = hub_settings.consumer_group.clone();

        let reader = StreamConsumptionSession::builder(Arc::new(
            hub.subscriber(group.clone())
                .with_checkpoint_store(store.clone()),
        ))
        .checkpointing(Checkpointing::new(
            store.clone(),
            group.clone(),
            reader_settings.policy,
        ))
        .drain_timeout(reader_settings.drain_timeout)
        .build();

        // Resumes from existing checkpoints but never writes any.
        let reader_no_checkpoint = StreamConsumptionSession::builder(Arc::new(
            hub.subscriber(group.clone()).with_checkpoint_store(store),
        ))
        .formatter(BodyFormatter)
        .drain_timeout(reader_settings.drain_timeout)
        .build();

        info!(
            event = "services.configured",
            domain = "services",
            hub = %hub.name(),
            consumer_group = %group,
            partitions = hub.partition_ids().len() as u64,
            checkpoint_threshold = reader_settings.policy.threshold()
        );
        Ok(Self {
            publisher: EventStreamPublisher::new(Arc::new(hub.clone())),
            requests: RequestPublisher::new(Arc::new(hub.clone()), default_partition(&lookup)),
            hub,
            reader,
            reader_no_checkpoint,
        })
    }

    pub fn hub(&self) -> &InMemoryEventHub {
        &self.hub
    }

    pub async fn execute(&self, step: &Step) -> Reply {
        match step {
            Step::Publish { count } => self.publish(count).await,
            Step::Request(args) => self.request(args).await,
            Step::Read { seconds } => self.read(&self.reader, seconds).await,
            Step::ReadNoCheckpoint { seconds } => {
                self.read(&self.reader_no_checkpoint, seconds).await
            }
        }
    }

    async fn publish(&self, count: &str) -> Reply {
        let Ok(count) = count.trim().parse::<i64>() else {
            return Reply::bad_request(format!("'{count}' is not an event count"));
        };
        Reply::from_publish(self.publisher.send_n_events(count).await, |report| {
            format!("sent {} of {} events", report.sent, report.requested)
        })
    }

    async fn request(&self, args: &RequestArgs) -> Reply {
        let mut request = UserRequest::new(
            args.user_id.clone(),
            args.request_id.clone(),
            args.request_type.clone(),
        );
        if !args.parameters.is_empty() {
            request = request.with_parameters(args.parameters.clone());
        }
        Reply::from_publish(self.requests.process_request(&request).await, |partition| {
            format!("request sent to partition {partition}")
        })
    }

    async fn read(&self, session: &StreamConsumptionSession, seconds: &str) -> Reply {
        let Ok(seconds) = seconds.trim().parse::<i64>() else {
            return Reply::bad_request(format!("'{seconds}' is not a number of seconds"));
        };
        Reply::from_session(session.run_for_seconds(seconds).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Status;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn memory_services(extra: &[(&str, &str)]) -> Services {
        let mut pairs = vec![
            ("ehns_connstring", "Endpoint=memory://local;PartitionCount=2"),
            ("eh_name", "orders"),
            ("storageacc_connstr", "memory://"),
            ("blobcontainername", "checkpoints"),
        ];
        pairs.extend_from_slice(extra);
        Services::from_lookup(lookup(&pairs)).expect("services")
    }

    fn step(raw: &str) -> Step {
        raw.parse().expect("step")
    }

    #[test]
    fn readers_need_storage_settings() {
        let err = Services::from_lookup(lookup(&[
            ("ehns_connstring", "Endpoint=memory://local"),
            ("eh_name", "orders"),
        ]))
        .err()
        .expect("missing storage");
        assert_eq!(
            err.to_string(),
            "Storage Account and Blob Container Name must be provided."
        );
    }

    #[tokio::test]
    async fn publish_then_read_with_checkpoints() {
        let services = memory_services(&[("eventsBeforeCheckpoint", "2")]);

        let reply = services.execute(&step("publish:3")).await;
        assert_eq!(reply.status, Status::Accepted);
        assert_eq!(reply.body, "sent 3 of 3 events");

        let reply = services.execute(&step("read:1")).await;
        assert_eq!(reply.status, Status::Ok);
        assert_eq!(reply.body.lines().count(), 3);
        assert!(reply.body.contains("Event Type: EventStream, Event Body: Event Number: 2"));

        // Events 0 and 1 were checkpointed; the body-only reader resumes after them.
        let reply = services.execute(&step("read-no-checkpoint:1")).await;
        assert_eq!(reply.body, "Event Number: 2\n");
    }

    #[tokio::test]
    async fn bad_arguments_are_bad_requests() {
        let services = memory_services(&[]);

        for raw in ["publish:many", "publish:-1", "read:0", "read:-5", "read-no-checkpoint:x", "request:u1,,buy"] {
            let reply = services.execute(&step(raw)).await;
            assert_eq!(reply.status, Status::BadRequest, "{raw}");
        }
    }

    #[tokio::test]
    async fn requests_route_by_type() {
        let services = memory_services(&[("eh_partition_id", "0")]);

        let reply = services.execute(&step("request:u1,r1,Sell,AAPL")).await;
        assert_eq!(reply.body, "request sent to partition 1");
        let reply = services.execute(&step("request:u1,r2,buy")).await;
        assert_eq!(reply.body, "request sent to partition 0");

        let hub = services.hub();
        assert_eq!(hub.partition_len(&"1".into()).await.unwrap(), 1);
        assert_eq!(hub.partition_len(&"0".into()).await.unwrap(), 1);
    }
}

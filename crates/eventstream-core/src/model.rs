//! Event, partition and checkpoint types shared by the coordinator and the platform.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribute carrying the event-type tag set by the publishers.
pub const EVENT_TYPE_ATTRIBUTE: &str = "EventType";

/// Fixed per-event framing cost counted against a batch's byte budget.
const EVENT_OVERHEAD_BYTES: usize = 16;

/// Opaque identifier of a stream partition.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub String);

impl PartitionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PartitionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// An event as delivered to a consumer. Immutable once produced by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumedEvent {
    pub partition_id: PartitionId,
    /// Position of the event within its partition, starting at 0.
    pub sequence_number: u64,
    pub payload: Bytes,
    pub attributes: HashMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl ConsumedEvent {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// An event on its way to the platform.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventData {
    pub body: Bytes,
    pub properties: HashMap<String, String>,
}

impl EventData {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn size_in_bytes(&self) -> usize {
        let properties: usize = self
            .properties
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        self.body.len() + properties + EVENT_OVERHEAD_BYTES
    }
}

/// Routing options for a send. An explicit partition wins over a partition key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub partition_id: Option<PartitionId>,
    pub partition_key: Option<String>,
}

impl SendOptions {
    pub fn to_partition(partition_id: impl Into<PartitionId>) -> Self {
        Self {
            partition_id: Some(partition_id.into()),
            partition_key: None,
        }
    }

    pub fn with_partition_key(partition_key: impl Into<String>) -> Self {
        Self {
            partition_id: None,
            partition_key: Some(partition_key.into()),
        }
    }
}

/// Size-bounded group of events sent in one call.
#[derive(Clone, Debug)]
pub struct EventBatch {
    max_bytes: usize,
    size_bytes: usize,
    events: Vec<EventData>,
    options: SendOptions,
}

impl EventBatch {
    pub fn new(max_bytes: usize, options: SendOptions) -> Self {
        Self {
            max_bytes,
            size_bytes: 0,
            events: Vec::new(),
            options,
        }
    }

    /// Adds `event` unless it would push the batch past its byte budget, in which
    /// case the event is handed back untouched.
    pub fn try_add(&mut self, event: EventData) -> Result<(), EventData> {
        let size = event.size_in_bytes();
        if self.size_bytes + size > self.max_bytes {
            return Err(event);
        }
        self.size_bytes += size;
        self.events.push(event);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    pub fn into_parts(self) -> (Vec<EventData>, SendOptions) {
        (self.events, self.options)
    }
}

/// Durable resume marker for one partition of one consumer group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub consumer_group: String,
    pub partition_id: PartitionId,
    /// Sequence number of the last event processed before the checkpoint.
    pub sequence_number: u64,
    pub committed_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn for_event(consumer_group: impl Into<String>, event: &ConsumedEvent) -> Self {
        Self {
            consumer_group: consumer_group.into(),
            partition_id: event.partition_id.clone(),
            sequence_number: event.sequence_number,
            committed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_refuses_event_past_budget() {
        let first = EventData::new("Event Number: 0");
        let budget = first.size_in_bytes() + 4;
        let mut batch = EventBatch::new(budget, SendOptions::default());

        assert!(batch.try_add(first).is_ok());
        let refused = batch
            .try_add(EventData::new("Event Number: 1"))
            .expect_err("second event does not fit");
        assert_eq!(refused.body, Bytes::from_static(b"Event Number: 1"));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn event_size_counts_properties() {
        let bare = EventData::new("abc");
        let tagged = EventData::new("abc").with_property(EVENT_TYPE_ATTRIBUTE, "EventStream");
        assert_eq!(
            tagged.size_in_bytes() - bare.size_in_bytes(),
            EVENT_TYPE_ATTRIBUTE.len() + "EventStream".len()
        );
    }

    #[test]
    fn body_text_is_lossy() {
        let event = ConsumedEvent {
            partition_id: PartitionId::from("0"),
            sequence_number: 0,
            payload: Bytes::from_static(&[b'o', b'k', 0xff]),
            attributes: HashMap::new(),
            received_at: Utc::now(),
        };
        assert_eq!(event.body_text(), "ok\u{fffd}");
    }
}

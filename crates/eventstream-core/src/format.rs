//! Turning delivered events into result lines.

use crate::errors::EventProcessingError;
use crate::model::{ConsumedEvent, EVENT_TYPE_ATTRIBUTE};

/// Renders one event as a result line.
pub trait EventFormatter: Send + Sync {
    fn format(&self, event: &ConsumedEvent) -> Result<String, EventProcessingError>;
}

/// `Partition: {id}, Event Type: {type}, Event Body: {body}`. Requires a non-blank event-type attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetailedFormatter;

impl EventFormatter for DetailedFormatter {
    fn format(&self, event: &ConsumedEvent) -> Result<String, EventProcessingError> {
        let event_type =
            event
                .attribute(EVENT_TYPE_ATTRIBUTE)
                .ok_or_else(|| EventProcessingError::MissingAttribute {
                    name: EVENT_TYPE_ATTRIBUTE.to_string(),
                })?;
        if event_type.trim().is_empty() {
            return Err(EventProcessingError::Malformed(format!(
                "attribute '{EVENT_TYPE_ATTRIBUTE}' is blank"
            )));
        }
        Ok(format!(
            "Partition: {}, Event Type: {}, Event Body: {}",
            event.partition_id,
            event_type,
            event.body_text()
        ))
    }
}

/// The event body alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyFormatter;

impl EventFormatter for BodyFormatter {
    fn format(&self, event: &ConsumedEvent) -> Result<String, EventProcessingError> {
        Ok(event.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use std::collections::HashMap;

    fn event(attributes: &[(&str, &str)]) -> ConsumedEvent {
        ConsumedEvent {
            partition_id: "1".into(),
            sequence_number: 4,
            payload: Bytes::from_static(b"Event Number: 4"),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn detailed_line_carries_partition_type_and_body() {
        let line = DetailedFormatter
            .format(&event(&[("EventType", "EventStream")]))
            .unwrap();
        assert_eq!(
            line,
            "Partition: 1, Event Type: EventStream, Event Body: Event Number: 4"
        );
    }

    #[test]
    fn detailed_requires_event_type() {
        let err = DetailedFormatter
            .format(&event(&[("eventtype", "EventStream")]))
            .unwrap_err();
        assert_eq!(
            err,
            EventProcessingError::MissingAttribute {
                name: "EventType".into()
            }
        );
    }

    #[test]
    fn detailed_rejects_blank_event_type() {
        let err = DetailedFormatter
            .format(&event(&[("EventType", "  ")]))
            .unwrap_err();
        assert_eq!(
            err,
            EventProcessingError::Malformed("attribute 'EventType' is blank".into())
        );
    }

    #[test]
    fn body_formatter_ignores_attributes() {
        assert_eq!(BodyFormatter.format(&event(&[])).unwrap(), "Event Number: 4");
    }
}

//! Producer-side services: synthetic event bursts and user requests.

mod events;
mod request;

pub use events::{EVENT_STREAM_TYPE, EventStreamPublisher, PublishReport};
pub use request::{REQUEST_EVENT_TYPE, RequestPublisher, SELL_PARTITION, UserRequest};

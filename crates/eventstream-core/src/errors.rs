use std::time::Duration;

use crate::model::PartitionId;

/// Errors returned from [`StreamConsumptionSession::run`](crate::session::StreamConsumptionSession::run).
///
/// Per-event and per-partition failures never surface here; they are recorded
/// inline in the session result instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The run window or another argument was rejected before any side effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Another run is already active on this session instance.
    #[error("session busy: a run is already active")]
    Busy,
    /// The subscription could not be opened.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Failure while turning a single delivered event into a result line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventProcessingError {
    /// A required event attribute is absent.
    #[error("the given key '{name}' was not present in the event attributes")]
    MissingAttribute { name: String },
    /// The event could not be interpreted by the formatter.
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// Failures reported by the streaming platform collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("checkpoint store failed: {0}")]
    Checkpoint(String),
    #[error("unknown partition: {0}")]
    UnknownPartition(PartitionId),
    #[error("batch of {size} bytes exceeds the maximum of {max} bytes")]
    BatchTooLarge { size: usize, max: usize },
    #[error("subscription drain did not complete within {0:?}")]
    Drain(Duration),
}

impl PlatformError {
    pub(crate) fn checkpoint(err: impl std::fmt::Display) -> Self {
        Self::Checkpoint(err.to_string())
    }
}

/// Construction-time configuration failure. Services refuse to start on these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Missing(String),
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("unsupported endpoint: {0}")]
    Unsupported(String),
}

/// Errors returned by the publisher services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

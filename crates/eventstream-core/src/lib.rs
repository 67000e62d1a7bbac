pub mod config;
pub mod errors;
pub mod format;
pub mod model;
pub mod observability;
pub mod platform;
pub mod policy;
pub mod publish;
pub mod session;
pub mod sink;
pub mod tracker;

// Minimal user-facing API: the session, its collaborators, and the in-process platform.
pub use errors::{
    ConfigError, EventProcessingError, PlatformError, PublishError, SessionError,
};
pub use format::{BodyFormatter, DetailedFormatter, EventFormatter};
pub use model::{
    CheckpointRecord, ConsumedEvent, EVENT_TYPE_ATTRIBUTE, EventBatch, EventData, PartitionId,
    SendOptions,
};
pub use platform::{
    CheckpointStore, EventHandler, FileCheckpointStore, InMemoryCheckpointStore,
    InMemoryEventHub, InMemorySubscription, PartitionFailure, StreamPublisher,
    StreamSubscription, SubscriptionHandle,
};
pub use policy::CheckpointPolicy;
pub use publish::{EventStreamPublisher, PublishReport, RequestPublisher, UserRequest};
pub use session::{
    CancelHandle, CancelSignal, Checkpointing, SessionState, StreamConsumptionSession,
    cancellation,
};
pub use sink::{ResultSink, SessionResult};
pub use tracker::PartitionProgressTracker;

//! Time-boxed consumption runs over a [`StreamSubscription`].
//!
//! A [`StreamConsumptionSession`] opens the subscription, lets the platform push
//! events into its handler for the run window (or until cancelled), closes the
//! subscription, waits for in-flight handlers to drain, and returns what was
//! accumulated.
//!
//! ## Lifetimes
//!
//! The output buffer is cleared at the start of every run. Partition progress
//! counters live as long as the session, so events consumed without reaching a
//! checkpoint keep counting in the next run.
//!
//! ## Drain
//!
//! A close that outlives the drain timeout keeps running in the background and
//! the session refuses new runs with [`SessionError::Busy`] until it finishes,
//! so handlers of two runs never overlap on the same partition.

mod cancel;
mod handler;

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{PlatformError, SessionError};
use crate::format::{DetailedFormatter, EventFormatter};
use crate::platform::{CheckpointStore, StreamSubscription, SubscriptionHandle};
use crate::policy::CheckpointPolicy;
use crate::sink::{ResultSink, SessionResult};
use crate::tracker::PartitionProgressTracker;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
use handler::ConsumptionHandler;

/// Upper bound on waiting for a closed subscription to drain.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run state. `Idle -> Opening -> Processing -> Closing -> Idle`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle = 0,
    Opening = 1,
    Processing = 2,
    Closing = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Opening,
            2 => Self::Processing,
            3 => Self::Closing,
            _ => Self::Idle,
        }
    }
}

/// Where and how often a session records resume positions.
#[derive(Clone)]
pub struct Checkpointing {
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) consumer_group: String,
    pub(crate) policy: CheckpointPolicy,
}

impl Checkpointing {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        consumer_group: impl Into<String>,
        policy: CheckpointPolicy,
    ) -> Self {
        Self {
            store,
            consumer_group: consumer_group.into(),
            policy,
        }
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }
}

/// How a run left the Processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Elapsed,
    Cancelled,
}

impl RunEnd {
    fn as_str(self) -> &'static str {
        match self {
            RunEnd::Elapsed => "elapsed",
            RunEnd::Cancelled => "cancelled",
        }
    }
}

type PendingClose = JoinHandle<Result<(), PlatformError>>;

/// Close of a subscription from an earlier run that has not finished draining.
#[derive(Default)]
struct PendingDrain {
    task: Mutex<Option<PendingClose>>,
}

impl PendingDrain {
    fn park(&self, task: PendingClose) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// True while a parked close is still running. A finished one is dropped.
    fn is_draining(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        match task.as_ref() {
            Some(pending) if !pending.is_finished() => true,
            _ => {
                *task = None;
                false
            }
        }
    }
}

/// Parks the close task on drop unless it already finished, so a timed-out or
/// interrupted drain still blocks later runs.
struct CloseInFlight<'a> {
    pending: &'a PendingDrain,
    task: Option<PendingClose>,
}

impl Drop for CloseInFlight<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take()
            && !task.is_finished()
        {
            self.pending.park(task);
        }
    }
}

/// Closes `handle` on its own task and logs a failure under `failure_event`.
fn spawn_close(
    subscription: Arc<dyn StreamSubscription>,
    handle: SubscriptionHandle,
    failure_event: &'static str,
) -> PendingClose {
    tokio::spawn(async move {
        let closed = subscription.close(handle).await;
        if let Err(err) = &closed {
            warn!(
                event = failure_event,
                domain = "consume",
                subscription = %handle,
                error = %err
            );
        }
        closed
    })
}

/// Marks a session busy for the duration of one run and returns it to Idle on drop.
///
/// If the run future is dropped while the subscription is still open, the
/// subscription is closed on a background task that later runs wait for.
struct ActiveRun<'a> {
    state: &'a AtomicU8,
    pending: &'a PendingDrain,
    open: Option<(Arc<dyn StreamSubscription>, SubscriptionHandle)>,
}

impl<'a> ActiveRun<'a> {
    fn acquire(state: &'a AtomicU8, pending: &'a PendingDrain) -> Result<Self, SessionError> {
        state
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Opening as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| SessionError::Busy)?;
        let active = Self {
            state,
            pending,
            open: None,
        };
        // Checked while holding the run so no close can be parked in between.
        if pending.is_draining() {
            return Err(SessionError::Busy);
        }
        Ok(active)
    }

    fn enter(&self, next: SessionState) {
        self.state.store(next as u8, Ordering::SeqCst);
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Some((subscription, handle)) = self.open.take() {
            warn!(
                event = "session.abandoned",
                domain = "consume",
                subscription = %handle
            );
            if tokio::runtime::Handle::try_current().is_ok() {
                self.pending.park(spawn_close(
                    subscription,
                    handle,
                    "session.abandoned_close_failed",
                ));
            }
        }
        self.state.store(SessionState::Idle as u8, Ordering::SeqCst);
    }
}

/// Builder for [`StreamConsumptionSession`].
pub struct SessionBuilder {
    subscription: Arc<dyn StreamSubscription>,
    formatter: Arc<dyn EventFormatter>,
    checkpointing: Option<Checkpointing>,
    drain_timeout: Duration,
}

impl SessionBuilder {
    /// Formatter used for result lines. Defaults to [`DetailedFormatter`].
    pub fn formatter(mut self, formatter: impl EventFormatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Enables checkpointing. Without it the session only reads.
    pub fn checkpointing(mut self, checkpointing: Checkpointing) -> Self {
        self.checkpointing = Some(checkpointing);
        self
    }

    pub fn drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn build(self) -> StreamConsumptionSession {
        StreamConsumptionSession {
            subscription: self.subscription,
            handler: Arc::new(ConsumptionHandler {
                sink: Arc::new(ResultSink::new()),
                tracker: Arc::new(PartitionProgressTracker::new()),
                formatter: self.formatter,
                checkpointing: self.checkpointing,
            }),
            state: AtomicU8::new(SessionState::Idle as u8),
            pending: PendingDrain::default(),
            drain_timeout: self.drain_timeout,
        }
    }
}

/// Orchestrates bounded consumption runs. One run at a time per instance.
pub struct StreamConsumptionSession {
    subscription: Arc<dyn StreamSubscription>,
    handler: Arc<ConsumptionHandler>,
    state: AtomicU8,
    pending: PendingDrain,
    drain_timeout: Duration,
}

impl StreamConsumptionSession {
    pub fn builder(subscription: Arc<dyn StreamSubscription>) -> SessionBuilder {
        SessionBuilder {
            subscription,
            formatter: Arc::new(DetailedFormatter),
            checkpointing: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Reports `Closing` while a timed-out drain from an earlier run is still running.
    pub fn state(&self) -> SessionState {
        match SessionState::from_u8(self.state.load(Ordering::SeqCst)) {
            SessionState::Idle if self.pending.is_draining() => SessionState::Closing,
            state => state,
        }
    }

    /// Progress counters, shared with the running handlers.
    pub fn tracker(&self) -> &PartitionProgressTracker {
        &self.handler.tracker
    }

    pub fn checkpointing(&self) -> Option<&Checkpointing> {
        self.handler.checkpointing.as_ref()
    }

    /// Consumes for `duration` and returns everything recorded meanwhile.
    pub async fn run(&self, duration: Duration) -> Result<SessionResult, SessionError> {
        self.run_until(duration, std::future::pending()).await
    }

    /// Same as [`run`](Self::run) for a window given in whole seconds, as
    /// received from callers; non-positive windows are rejected.
    pub async fn run_for_seconds(&self, seconds: i64) -> Result<SessionResult, SessionError> {
        if seconds <= 0 {
            return Err(SessionError::InvalidArgument(format!(
                "run window must be a positive number of seconds, got {seconds}"
            )));
        }
        self.run(Duration::from_secs(seconds as u64)).await
    }

    /// Consumes until `duration` elapses or `cancelled` resolves, whichever is
    /// first. A cancelled run still closes and drains the subscription and
    /// returns the partial result.
    pub async fn run_until<F>(
        &self,
        duration: Duration,
        cancelled: F,
    ) -> Result<SessionResult, SessionError>
    where
        F: Future<Output = ()> + Send,
    {
        if duration.is_zero() {
            return Err(SessionError::InvalidArgument(
                "run duration must be positive".into(),
            ));
        }
        let mut active = ActiveRun::acquire(&self.state, &self.pending)?;
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        self.handler.sink.clear();
        info!(
            event = "session.started",
            domain = "consume",
            run_id = %run_id,
            duration_ms = duration.as_millis() as u64,
            checkpointing = self.handler.checkpointing.is_some()
        );

        let handle = match self.subscription.open(self.handler.clone()).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(
                    event = "session.open_failed",
                    domain = "consume",
                    run_id = %run_id,
                    error = %err
                );
                return Err(err.into());
            }
        };
        active.open = Some((self.subscription.clone(), handle));
        active.enter(SessionState::Processing);

        let end = tokio::select! {
            _ = tokio::time::sleep(duration) => RunEnd::Elapsed,
            _ = cancelled => RunEnd::Cancelled,
        };

        active.enter(SessionState::Closing);
        active.open = None;
        self.close_subscription(run_id, handle).await;

        let result = self.handler.sink.snapshot();
        info!(
            event = "session.finished",
            domain = "consume",
            run_id = %run_id,
            end = end.as_str(),
            lines = result.len() as u64,
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        Ok(result)
    }

    /// Closes the subscription, bounded by the drain timeout. Failures are
    /// recorded in the result rather than returned. A close still running at the
    /// timeout is parked and blocks later runs until it completes.
    async fn close_subscription(&self, run_id: Uuid, handle: SubscriptionHandle) {
        let mut close = CloseInFlight {
            pending: &self.pending,
            task: Some(spawn_close(
                self.subscription.clone(),
                handle,
                "session.late_close_failed",
            )),
        };
        let Some(task) = close.task.as_mut() else {
            return;
        };
        let err = match tokio::time::timeout(self.drain_timeout, task).await {
            Ok(Ok(Ok(()))) => return,
            Ok(Ok(Err(err))) => err,
            Ok(Err(joined)) => PlatformError::Subscription(joined.to_string()),
            Err(_) => PlatformError::Drain(self.drain_timeout),
        };
        warn!(
            event = "session.close_failed",
            domain = "consume",
            run_id = %run_id,
            error = %err
        );
        self.handler.sink.append(format!("Subscription: {err}"));
    }
}

//! The scheduler surface the run shell drives, and the facade wiring it
//! to the listener bus, the job factory, and the job store.
//!
//! The top-level scheduler (due-trigger selection, worker pool, public
//! API) lives outside this crate; what is here is exactly the set of
//! hooks a [`JobRunShell`](crate::execution::JobRunShell) invokes while
//! executing one firing, plus a concrete [`SchedulerCore`] that wires
//! those hooks together.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::job::{Job, JobDetail, JobExecutionError};
use crate::core::trigger::{CompletedExecutionInstruction, Trigger, TriggerError};
use crate::execution::{FiredTriggerBundle, JobExecutionContext};
use crate::listeners::ListenerManager;

/// Failure kinds reported by the job store.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// The write could not be persisted; safe to retry.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The addressed trigger or job does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),
}

impl JobStoreError {
    /// Whether this failure is the retriable persistence kind.
    pub fn is_persistence(&self) -> bool {
        matches!(self, JobStoreError::Persistence(_))
    }
}

/// Scheduler-level error taxonomy.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The caller handed the scheduler an unusable definition.
    #[error("client error: {0}")]
    ClientError(String),

    /// A trigger mutator rejected an argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] TriggerError),

    /// The job factory could not produce a job instance.
    #[error("job '{job}' could not be instantiated: {message}")]
    JobInstantiation { job: String, message: String },

    /// The job raised a non-domain error (a panic) during execution.
    #[error("job '{job}' threw an unhandled error: {message}")]
    JobExecutionThrew { job: String, message: String },

    /// A trigger misbehaved while classifying a finished execution.
    #[error("trigger '{trigger}' failed while completing execution: {message}")]
    TriggerThrew { trigger: String, message: String },

    /// A listener failed during notification.
    #[error("listener '{listener}' failed: {source}")]
    ListenerError {
        listener: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A listener name on a trigger or job detail is not registered.
    #[error("listener '{0}' is not registered")]
    UnknownListener(String),

    /// The job store failed.
    #[error("job store failure: {0}")]
    Store(#[from] JobStoreError),
}

/// Creates the job instance for one firing.
pub trait JobFactory: Send + Sync {
    /// Produce the instance that will execute the fired bundle's job.
    /// Failures are reported to scheduler listeners by the shell.
    fn new_job(&self, bundle: &FiredTriggerBundle) -> Result<Arc<dyn Job>, SchedulerError>;
}

/// The sliver of the job store the execution core consumes.
pub trait JobStore: Send + Sync {
    /// Record the disposition of a finished firing.
    fn triggered_job_complete(
        &self,
        trigger: &Trigger,
        job_detail: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), JobStoreError>;
}

/// Everything a run shell invokes on the scheduler while executing one
/// firing.
pub trait SchedulerRuntime: Send + Sync {
    /// Create the job instance for a fired bundle.
    fn new_job(&self, bundle: &FiredTriggerBundle) -> Result<Arc<dyn Job>, SchedulerError>;

    /// Notify trigger listeners the trigger fired; returns whether any
    /// listener vetoed the execution.
    fn notify_trigger_listeners_fired(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<bool, SchedulerError>;

    /// Notify job listeners execution is imminent.
    fn notify_job_listeners_to_be_executed(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError>;

    /// Notify job listeners the execution was vetoed.
    fn notify_job_listeners_was_vetoed(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError>;

    /// Notify job listeners the execution finished, with the job error
    /// if one was raised.
    fn notify_job_listeners_was_executed(
        &self,
        ctx: &JobExecutionContext,
        error: Option<&JobExecutionError>,
    ) -> Result<(), SchedulerError>;

    /// Notify trigger listeners of the completed execution's instruction.
    fn notify_trigger_listeners_complete(
        &self,
        ctx: &JobExecutionContext,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), SchedulerError>;

    /// Report an error to scheduler listeners. Best effort.
    fn notify_scheduler_listeners_error(&self, message: &str, error: &SchedulerError);

    /// Report that a trigger will never fire again. Best effort.
    fn notify_scheduler_listeners_finalized(&self, trigger: &Trigger);

    /// Wake the scheduler thread so it can select the next due trigger.
    fn notify_scheduler_thread(&self);

    /// Report a finished firing's disposition to the job store.
    fn notify_job_store_job_complete(
        &self,
        ctx: &JobExecutionContext,
        trigger: &Trigger,
        job_detail: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), SchedulerError>;
}

/// Wake-up signal between run shells and the scheduler thread.
///
/// A notification arriving while nobody waits is remembered and consumed
/// by the next wait.
pub struct SchedulerSignal {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl SchedulerSignal {
    /// Create a signal with no pending notification.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Post a notification, waking one pending wait.
    pub fn notify(&self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *pending = true;
        self.cv.notify_all();
    }

    /// Wait up to `timeout` for a notification. Returns whether one was
    /// consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if *pending {
                *pending = false;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(pending, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            pending = guard;
        }
    }
}

impl Default for SchedulerSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Concrete wiring of the run-shell surface: job factory, listener bus,
/// job store, and the scheduler-thread signal.
pub struct SchedulerCore {
    job_factory: Arc<dyn JobFactory>,
    listeners: ListenerManager,
    store: Arc<dyn JobStore>,
    signal: Arc<SchedulerSignal>,
}

impl SchedulerCore {
    /// Wire a facade over the given factory and store, with an empty
    /// listener bus.
    pub fn new(job_factory: Arc<dyn JobFactory>, store: Arc<dyn JobStore>) -> Self {
        Self {
            job_factory,
            listeners: ListenerManager::new(),
            store,
            signal: Arc::new(SchedulerSignal::new()),
        }
    }

    /// The listener bus, for registering listeners.
    pub fn listeners(&self) -> &ListenerManager {
        &self.listeners
    }

    /// The scheduler-thread wake signal.
    pub fn signal(&self) -> &Arc<SchedulerSignal> {
        &self.signal
    }
}

impl SchedulerRuntime for SchedulerCore {
    fn new_job(&self, bundle: &FiredTriggerBundle) -> Result<Arc<dyn Job>, SchedulerError> {
        self.job_factory.new_job(bundle)
    }

    fn notify_trigger_listeners_fired(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<bool, SchedulerError> {
        self.listeners.notify_trigger_listeners_fired(ctx)
    }

    fn notify_job_listeners_to_be_executed(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError> {
        self.listeners.notify_job_listeners_to_be_executed(ctx)
    }

    fn notify_job_listeners_was_vetoed(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError> {
        self.listeners.notify_job_listeners_was_vetoed(ctx)
    }

    fn notify_job_listeners_was_executed(
        &self,
        ctx: &JobExecutionContext,
        error: Option<&JobExecutionError>,
    ) -> Result<(), SchedulerError> {
        self.listeners.notify_job_listeners_was_executed(ctx, error)
    }

    fn notify_trigger_listeners_complete(
        &self,
        ctx: &JobExecutionContext,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), SchedulerError> {
        self.listeners
            .notify_trigger_listeners_complete(ctx, instruction)
    }

    fn notify_scheduler_listeners_error(&self, message: &str, error: &SchedulerError) {
        self.listeners.notify_scheduler_listeners_error(message, error);
    }

    fn notify_scheduler_listeners_finalized(&self, trigger: &Trigger) {
        self.listeners.notify_scheduler_listeners_finalized(trigger);
    }

    fn notify_scheduler_thread(&self) {
        self.signal.notify();
    }

    fn notify_job_store_job_complete(
        &self,
        _ctx: &JobExecutionContext,
        trigger: &Trigger,
        job_detail: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), SchedulerError> {
        self.store
            .triggered_job_complete(trigger, job_detail, instruction)?;
        Ok(())
    }
}

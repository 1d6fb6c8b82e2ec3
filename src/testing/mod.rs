//! Testing utilities for users of the library.
//!
//! Deterministic doubles for every collaborator the execution core
//! consumes:
//!
//! - [`CountingJob`], [`FailingJob`], [`RefiringJob`], [`PanickingJob`]:
//!   jobs with scripted outcomes
//! - [`RecordingTriggerListener`], [`RecordingJobListener`],
//!   [`RecordingSchedulerListener`]: listeners that record what they saw
//! - [`SimpleJobFactory`], [`FailingJobFactory`]: job factories
//! - [`InMemoryJobStore`]: a store that records completions and can
//!   inject persistence failures
//! - [`CollectingShellFactory`]: a shell factory that keeps returned
//!   shells for inspection
//! - [`NullRuntime`]: a scheduler surface that ignores every
//!   notification, for tests that only need a context

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::core::job::{Job, JobDetail, JobExecutionError};
use crate::core::key::{JobKey, TriggerKey};
use crate::core::trigger::{CompletedExecutionInstruction, Trigger};
use crate::execution::{FiredTriggerBundle, JobExecutionContext, JobRunShell, JobRunShellFactory};
use crate::listeners::{JobListener, ListenerError, SchedulerListener, TriggerListener};
use crate::scheduler::{JobFactory, JobStore, JobStoreError, SchedulerError, SchedulerRuntime};

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A job that counts its executions and succeeds.
pub struct CountingJob {
    executions: AtomicU32,
}

impl CountingJob {
    /// Create a job with a zero execution count.
    pub fn new() -> Self {
        Self {
            executions: AtomicU32::new(0),
        }
    }

    /// How many times the job has executed.
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Default for CountingJob {
    fn default() -> Self {
        Self::new()
    }
}

impl Job for CountingJob {
    fn execute(&self, _ctx: &mut JobExecutionContext) -> Result<(), JobExecutionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A job that always fails with a configurable error.
pub struct FailingJob {
    error: Box<dyn Fn() -> JobExecutionError + Send + Sync>,
    executions: AtomicU32,
}

impl FailingJob {
    /// Fail with a plain error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Box::new(move || JobExecutionError::new(message.clone())),
            executions: AtomicU32::new(0),
        }
    }

    /// Fail with the error the closure produces, e.g. to set
    /// unschedule dispositions.
    pub fn with_error(error: impl Fn() -> JobExecutionError + Send + Sync + 'static) -> Self {
        Self {
            error: Box::new(error),
            executions: AtomicU32::new(0),
        }
    }

    /// How many times the job has executed.
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Job for FailingJob {
    fn execute(&self, _ctx: &mut JobExecutionContext) -> Result<(), JobExecutionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }
}

/// A job that requests immediate re-execution a fixed number of times,
/// then succeeds.
pub struct RefiringJob {
    refires: u32,
    executions: AtomicU32,
}

impl RefiringJob {
    /// Request `refires` immediate re-executions before succeeding.
    pub fn new(refires: u32) -> Self {
        Self {
            refires,
            executions: AtomicU32::new(0),
        }
    }

    /// How many times the job has executed.
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Job for RefiringJob {
    fn execute(&self, _ctx: &mut JobExecutionContext) -> Result<(), JobExecutionError> {
        let done = self.executions.fetch_add(1, Ordering::SeqCst);
        if done < self.refires {
            Err(JobExecutionError::new("go again").with_refire_immediately())
        } else {
            Ok(())
        }
    }
}

/// A job that panics, exercising the unhandled-error path.
pub struct PanickingJob {
    message: String,
}

impl PanickingJob {
    /// Panic with the given message on every execution.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Job for PanickingJob {
    fn execute(&self, _ctx: &mut JobExecutionContext) -> Result<(), JobExecutionError> {
        panic!("{}", self.message.clone());
    }
}

/// Trigger listener that records notifications and optionally vetoes.
pub struct RecordingTriggerListener {
    name: String,
    veto: bool,
    fired: AtomicU32,
    completions: Mutex<Vec<CompletedExecutionInstruction>>,
}

impl RecordingTriggerListener {
    /// A listener that never vetoes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            veto: false,
            fired: AtomicU32::new(0),
            completions: Mutex::new(Vec::new()),
        }
    }

    /// A listener that vetoes every execution.
    pub fn vetoing(name: impl Into<String>) -> Self {
        Self {
            veto: true,
            ..Self::new(name)
        }
    }

    /// How many fired notifications were received.
    pub fn fired_count(&self) -> u32 {
        self.fired.load(Ordering::SeqCst)
    }

    /// Instructions received in complete notifications, in order.
    pub fn completions(&self) -> Vec<CompletedExecutionInstruction> {
        lock(&self.completions).clone()
    }
}

impl TriggerListener for RecordingTriggerListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger_fired(
        &self,
        _trigger: &Trigger,
        _ctx: &JobExecutionContext,
    ) -> Result<(), ListenerError> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn veto_job_execution(
        &self,
        _trigger: &Trigger,
        _ctx: &JobExecutionContext,
    ) -> Result<bool, ListenerError> {
        Ok(self.veto)
    }

    fn trigger_complete(
        &self,
        _trigger: &Trigger,
        _ctx: &JobExecutionContext,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), ListenerError> {
        lock(&self.completions).push(instruction);
        Ok(())
    }
}

/// Job listener that records the notifications it received.
pub struct RecordingJobListener {
    name: String,
    to_be_executed: AtomicU32,
    vetoed: AtomicU32,
    executed: Mutex<Vec<Option<String>>>,
}

impl RecordingJobListener {
    /// Create a listener with empty records.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            to_be_executed: AtomicU32::new(0),
            vetoed: AtomicU32::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// How many to-be-executed notifications were received.
    pub fn to_be_executed_count(&self) -> u32 {
        self.to_be_executed.load(Ordering::SeqCst)
    }

    /// How many vetoed notifications were received.
    pub fn vetoed_count(&self) -> u32 {
        self.vetoed.load(Ordering::SeqCst)
    }

    /// Error messages (or `None` for clean runs) from was-executed
    /// notifications, in order.
    pub fn executed(&self) -> Vec<Option<String>> {
        lock(&self.executed).clone()
    }
}

impl JobListener for RecordingJobListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn job_to_be_executed(&self, _ctx: &JobExecutionContext) -> Result<(), ListenerError> {
        self.to_be_executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn job_execution_vetoed(&self, _ctx: &JobExecutionContext) -> Result<(), ListenerError> {
        self.vetoed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn job_was_executed(
        &self,
        _ctx: &JobExecutionContext,
        error: Option<&JobExecutionError>,
    ) -> Result<(), ListenerError> {
        lock(&self.executed).push(error.map(|e| e.to_string()));
        Ok(())
    }
}

/// Scheduler listener that records errors and finalized triggers.
pub struct RecordingSchedulerListener {
    errors: Mutex<Vec<String>>,
    finalized: Mutex<Vec<TriggerKey>>,
}

impl RecordingSchedulerListener {
    /// Create a listener with empty records.
    pub fn new() -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
            finalized: Mutex::new(Vec::new()),
        }
    }

    /// Error messages received, in order.
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    /// Keys of finalized triggers, in order.
    pub fn finalized(&self) -> Vec<TriggerKey> {
        lock(&self.finalized).clone()
    }
}

impl Default for RecordingSchedulerListener {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerListener for RecordingSchedulerListener {
    fn scheduler_error(&self, message: &str, error: &SchedulerError) {
        lock(&self.errors).push(format!("{}: {}", message, error));
    }

    fn trigger_finalized(&self, trigger: &Trigger) {
        lock(&self.finalized).push(trigger.key());
    }
}

/// Job factory that hands out the same shared instance.
pub struct SimpleJobFactory {
    job: Arc<dyn Job>,
}

impl SimpleJobFactory {
    /// Always produce `job`.
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self { job }
    }
}

impl JobFactory for SimpleJobFactory {
    fn new_job(&self, _bundle: &FiredTriggerBundle) -> Result<Arc<dyn Job>, SchedulerError> {
        Ok(Arc::clone(&self.job))
    }
}

/// Job factory that always fails to instantiate.
pub struct FailingJobFactory {
    message: String,
}

impl FailingJobFactory {
    /// Fail with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl JobFactory for FailingJobFactory {
    fn new_job(&self, bundle: &FiredTriggerBundle) -> Result<Arc<dyn Job>, SchedulerError> {
        Err(SchedulerError::JobInstantiation {
            job: bundle.job_detail().key().full_name(),
            message: self.message.clone(),
        })
    }
}

/// A recorded store completion.
#[derive(Debug, Clone)]
pub struct RecordedCompletion {
    /// Key of the completed trigger.
    pub trigger: TriggerKey,
    /// Key of the fired job.
    pub job: JobKey,
    /// The instruction the shell reported.
    pub instruction: CompletedExecutionInstruction,
}

/// In-memory job store double recording completions, with optional
/// persistence-failure injection.
pub struct InMemoryJobStore {
    completions: Mutex<Vec<RecordedCompletion>>,
    failures_remaining: Mutex<Option<u32>>,
    attempts: AtomicU32,
}

impl InMemoryJobStore {
    /// A store that accepts every completion.
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(None),
            attempts: AtomicU32::new(0),
        }
    }

    /// A store whose first `n` completion writes fail with a
    /// persistence error.
    pub fn failing_times(n: u32) -> Self {
        Self {
            failures_remaining: Mutex::new(Some(n)),
            ..Self::new()
        }
    }

    /// A store whose completion writes always fail with a persistence
    /// error.
    pub fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    /// Completions recorded so far, in order.
    pub fn completions(&self) -> Vec<RecordedCompletion> {
        lock(&self.completions).clone()
    }

    /// Number of write attempts, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Assign a fresh fire-instance id to a trigger, as the real store
    /// does when it selects the trigger for firing.
    pub fn assign_fire_instance_id(&self, trigger: &mut Trigger) {
        trigger.set_fire_instance_id(Some(Uuid::new_v4().to_string()));
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for InMemoryJobStore {
    fn triggered_job_complete(
        &self,
        trigger: &Trigger,
        job_detail: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), JobStoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut failures = lock(&self.failures_remaining);
        if let Some(remaining) = failures.as_mut() {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(JobStoreError::Persistence(
                    "injected persistence failure".to_string(),
                ));
            }
        }
        lock(&self.completions).push(RecordedCompletion {
            trigger: trigger.key(),
            job: job_detail.key().clone(),
            instruction,
        });
        Ok(())
    }
}

/// Shell factory that keeps every returned shell for inspection.
pub struct CollectingShellFactory {
    returned: Mutex<Vec<JobRunShell>>,
}

impl CollectingShellFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self {
            returned: Mutex::new(Vec::new()),
        }
    }

    /// How many shells have been returned.
    pub fn returned_count(&self) -> usize {
        lock(&self.returned).len()
    }
}

impl Default for CollectingShellFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunShellFactory for CollectingShellFactory {
    fn return_job_run_shell(&self, shell: JobRunShell) {
        lock(&self.returned).push(shell);
    }
}

/// A scheduler surface that ignores every notification. Useful when a
/// test only needs a [`JobExecutionContext`].
pub struct NullRuntime;

impl NullRuntime {
    /// Create the runtime.
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerRuntime for NullRuntime {
    fn new_job(&self, bundle: &FiredTriggerBundle) -> Result<Arc<dyn Job>, SchedulerError> {
        Err(SchedulerError::JobInstantiation {
            job: bundle.job_detail().key().full_name(),
            message: "null runtime has no job factory".to_string(),
        })
    }

    fn notify_trigger_listeners_fired(
        &self,
        _ctx: &JobExecutionContext,
    ) -> Result<bool, SchedulerError> {
        Ok(false)
    }

    fn notify_job_listeners_to_be_executed(
        &self,
        _ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError> {
        Ok(())
    }

    fn notify_job_listeners_was_vetoed(
        &self,
        _ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError> {
        Ok(())
    }

    fn notify_job_listeners_was_executed(
        &self,
        _ctx: &JobExecutionContext,
        _error: Option<&JobExecutionError>,
    ) -> Result<(), SchedulerError> {
        Ok(())
    }

    fn notify_trigger_listeners_complete(
        &self,
        _ctx: &JobExecutionContext,
        _instruction: CompletedExecutionInstruction,
    ) -> Result<(), SchedulerError> {
        Ok(())
    }

    fn notify_scheduler_listeners_error(&self, _message: &str, _error: &SchedulerError) {}

    fn notify_scheduler_listeners_finalized(&self, _trigger: &Trigger) {}

    fn notify_scheduler_thread(&self) {}

    fn notify_job_store_job_complete(
        &self,
        _ctx: &JobExecutionContext,
        _trigger: &Trigger,
        _job_detail: &JobDetail,
        _instruction: CompletedExecutionInstruction,
    ) -> Result<(), SchedulerError> {
        Ok(())
    }
}

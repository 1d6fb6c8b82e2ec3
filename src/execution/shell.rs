//! The job run shell: the envelope that executes one firing decision
//! end to end on a worker thread.
//!
//! A shell runs exactly one firing, possibly executing the job several
//! times without releasing the worker when the trigger asks for an
//! immediate re-execute. Every error raised along the way is captured;
//! nothing propagates out of [`run`](JobRunShell::run). User-visible
//! reporting happens exclusively through the scheduler listener bus.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::bundle::FiredTriggerBundle;
use super::context::JobExecutionContext;
use crate::core::job::JobExecutionError;
use crate::core::trigger::CompletedExecutionInstruction;
use crate::scheduler::{SchedulerError, SchedulerRuntime};

/// Pause between attempts to report a completed firing to a failing
/// job store.
const STORE_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Pool owner a shell hands itself back to after finishing.
pub trait JobRunShellFactory: Send + Sync {
    /// Take back a passivated shell.
    fn return_job_run_shell(&self, shell: JobRunShell);
}

/// Extension point bracketing each execution pass, for shells that must
/// wrap the firing in a store transaction. Both hooks default to no-ops.
pub trait ExecutionHooks: Send {
    /// Called before listeners are notified and the job runs.
    fn begin(&mut self) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Called when a pass finishes. `successful` is false only for the
    /// intermediate completion before an immediate re-execute.
    fn complete(&mut self, _successful: bool) -> Result<(), SchedulerError> {
        Ok(())
    }
}

/// The default, transactionless hooks.
pub struct NoopHooks;

impl ExecutionHooks for NoopHooks {}

struct ShutdownFlag {
    requested: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownFlag {
    fn new() -> Self {
        Self {
            requested: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn request(&self) {
        let mut requested = self
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *requested = true;
        self.cv.notify_all();
    }

    fn is_requested(&self) -> bool {
        *self
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`, waking early on a shutdown request.
    /// Returns whether shutdown was requested.
    fn sleep_unless_requested(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if *requested {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(requested, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            requested = guard;
        }
    }
}

/// Cooperative shutdown handle for a shell whose `run` has consumed it.
/// Only the persistence retry loop observes the request; in-flight job
/// execution is never interrupted.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<ShutdownFlag>,
}

impl ShutdownHandle {
    /// Ask the shell to stop retrying its store notification.
    pub fn request_shutdown(&self) {
        self.flag.request();
    }
}

/// Executes one firing decision from end to end on a worker thread.
pub struct JobRunShell {
    scheduler: Arc<dyn SchedulerRuntime>,
    factory: Option<Arc<dyn JobRunShellFactory>>,
    hooks: Box<dyn ExecutionHooks>,
    ctx: Option<JobExecutionContext>,
    shutdown: Arc<ShutdownFlag>,
}

impl JobRunShell {
    /// Create a shell bound to its scheduler surface and owning factory.
    pub fn new(scheduler: Arc<dyn SchedulerRuntime>, factory: Arc<dyn JobRunShellFactory>) -> Self {
        Self {
            scheduler,
            factory: Some(factory),
            hooks: Box::new(NoopHooks),
            ctx: None,
            shutdown: Arc::new(ShutdownFlag::new()),
        }
    }

    /// Install transaction hooks around each execution pass.
    pub fn with_hooks(mut self, hooks: Box<dyn ExecutionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Instantiate the job for the fired bundle and build the execution
    /// context. A factory failure is reported to scheduler listeners
    /// before it is returned.
    pub fn initialize(&mut self, bundle: FiredTriggerBundle) -> Result<(), SchedulerError> {
        let job = match self.scheduler.new_job(&bundle) {
            Ok(job) => job,
            Err(e) => {
                let message = format!(
                    "unable to instantiate job '{}' for trigger '{}'",
                    bundle.job_detail().key(),
                    bundle.trigger().full_name()
                );
                tracing::error!(
                    job = %bundle.job_detail().key(),
                    trigger = %bundle.trigger().full_name(),
                    error = %e,
                    "job instantiation failed"
                );
                self.scheduler.notify_scheduler_listeners_error(&message, &e);
                return Err(e);
            }
        };
        self.ctx = Some(JobExecutionContext::new(
            Arc::clone(&self.scheduler),
            bundle,
            job,
        ));
        Ok(())
    }

    /// The execution context, present between `initialize` and
    /// `passivate`.
    pub fn context(&self) -> Option<&JobExecutionContext> {
        self.ctx.as_ref()
    }

    /// A handle that can request shutdown after `run` has consumed the
    /// shell.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    /// Request cooperative shutdown. Only the persistence retry loop
    /// observes it.
    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_requested()
    }

    /// Clear per-firing references before returning to the pool.
    pub fn passivate(&mut self) {
        self.ctx = None;
    }

    /// Run the firing to completion, then wake the scheduler thread and
    /// hand the shell back to its factory.
    ///
    /// Returns `false` only when a shutdown request aborted the
    /// persistence retry loop; every other outcome, including aborted
    /// and vetoed firings, returns `true`.
    pub fn run(mut self) -> bool {
        let result = self.run_loop();

        self.scheduler.notify_scheduler_thread();
        self.passivate();
        let factory = self.factory.clone();
        if let Some(factory) = factory {
            factory.return_job_run_shell(self);
        }
        result
    }

    fn run_loop(&mut self) -> bool {
        let scheduler = Arc::clone(&self.scheduler);

        if self.ctx.is_none() {
            tracing::error!("job run shell started without initialization");
            return true;
        }

        loop {
            // begin hook
            if let Err(e) = self.hooks.begin() {
                let message = self.describe("error in begin hook for firing of trigger");
                scheduler.notify_scheduler_listeners_error(&message, &e);
                return true;
            }

            // pre-execution notifications; listeners may veto
            match self.notify_listeners_beginning(&scheduler) {
                PreFire::Proceed => {}
                PreFire::Abort => return true,
                PreFire::Vetoed => {
                    if let Err(e) = self.hooks.complete(true) {
                        let message = self.describe("error in complete hook after vetoed firing of trigger");
                        scheduler.notify_scheduler_listeners_error(&message, &e);
                    }
                    return true;
                }
            }

            // execute the job, clocking the pass
            let job_error = self.execute_job(&scheduler);

            // post-execution job listener notification
            {
                let ctx = match self.ctx.as_ref() {
                    Some(ctx) => ctx,
                    None => return true,
                };
                if let Err(e) = scheduler.notify_job_listeners_was_executed(ctx, job_error.as_ref())
                {
                    let message = self.describe("unable to notify job listeners of executed job for trigger");
                    scheduler.notify_scheduler_listeners_error(&message, &e);
                    return true;
                }
            }

            // ask the trigger what to do with the finished execution
            let instruction = self.classify_completion(&scheduler, job_error.as_ref());

            // post-execution trigger listener notification
            {
                let ctx = match self.ctx.as_ref() {
                    Some(ctx) => ctx,
                    None => return true,
                };
                if let Err(e) = scheduler.notify_trigger_listeners_complete(ctx, instruction) {
                    let message = self.describe("unable to notify trigger listeners of completed firing of trigger");
                    scheduler.notify_scheduler_listeners_error(&message, &e);
                    return true;
                }
                if ctx.trigger().next_fire_time().is_none() {
                    scheduler.notify_scheduler_listeners_finalized(ctx.trigger());
                }
            }

            if instruction == CompletedExecutionInstruction::ReExecuteJob {
                if let Some(ctx) = self.ctx.as_mut() {
                    ctx.increment_refire_count();
                }
                if let Err(e) = self.hooks.complete(false) {
                    let message = self.describe("error in complete hook before re-execution of trigger");
                    scheduler.notify_scheduler_listeners_error(&message, &e);
                }
                continue;
            }

            if let Err(e) = self.hooks.complete(true) {
                let message = self.describe("error in complete hook for firing of trigger");
                scheduler.notify_scheduler_listeners_error(&message, &e);
            }

            // report the disposition to the job store
            return self.notify_job_store(&scheduler, instruction);
        }
    }

    /// Trigger listeners' fired callbacks (which may veto), then job
    /// listeners' to-be-executed.
    fn notify_listeners_beginning(&self, scheduler: &Arc<dyn SchedulerRuntime>) -> PreFire {
        let ctx = match self.ctx.as_ref() {
            Some(ctx) => ctx,
            None => return PreFire::Abort,
        };

        let vetoed = match scheduler.notify_trigger_listeners_fired(ctx) {
            Ok(vetoed) => vetoed,
            Err(e) => {
                let message = format!(
                    "unable to notify trigger listeners while firing trigger '{}' (job will not run)",
                    ctx.trigger().full_name()
                );
                scheduler.notify_scheduler_listeners_error(&message, &e);
                return PreFire::Abort;
            }
        };

        if vetoed {
            tracing::debug!(
                trigger = %ctx.trigger().full_name(),
                "execution vetoed by trigger listener"
            );
            if let Err(e) = scheduler.notify_job_listeners_was_vetoed(ctx) {
                let message = format!(
                    "unable to notify job listeners of vetoed execution for trigger '{}'",
                    ctx.trigger().full_name()
                );
                scheduler.notify_scheduler_listeners_error(&message, &e);
            }
            return PreFire::Vetoed;
        }

        if let Err(e) = scheduler.notify_job_listeners_to_be_executed(ctx) {
            let message = format!(
                "unable to notify job listeners of upcoming execution for trigger '{}' (job will not run)",
                ctx.trigger().full_name()
            );
            scheduler.notify_scheduler_listeners_error(&message, &e);
            return PreFire::Abort;
        }

        PreFire::Proceed
    }

    /// Invoke the job, recording wall-clock run time on the context.
    /// A domain error is captured and returned; a panic is converted
    /// into a scheduler error plus a synthesized non-refire job error.
    fn execute_job(&mut self, scheduler: &Arc<dyn SchedulerRuntime>) -> Option<JobExecutionError> {
        let (job, trigger_name, job_name) = match self.ctx.as_ref() {
            Some(ctx) => (
                ctx.job_instance(),
                ctx.trigger().full_name(),
                ctx.job_detail().key().full_name(),
            ),
            None => return None,
        };

        tracing::debug!(trigger = %trigger_name, job = %job_name, "calling execute on job");
        let started = Instant::now();
        let outcome = {
            let ctx = match self.ctx.as_mut() {
                Some(ctx) => ctx,
                None => return None,
            };
            catch_unwind(AssertUnwindSafe(|| job.execute(ctx)))
        };
        let elapsed = started.elapsed();
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.set_job_run_time(elapsed);
        }

        match outcome {
            Ok(Ok(())) => {
                tracing::debug!(
                    trigger = %trigger_name,
                    job = %job_name,
                    run_time_ms = elapsed.as_millis() as u64,
                    "job execution complete"
                );
                None
            }
            Ok(Err(job_error)) => {
                tracing::info!(
                    trigger = %trigger_name,
                    job = %job_name,
                    error = %job_error,
                    "job raised an execution error"
                );
                Some(job_error)
            }
            Err(panic) => {
                let message = panic_message(panic);
                tracing::error!(
                    trigger = %trigger_name,
                    job = %job_name,
                    panic = %message,
                    "job threw an unhandled error"
                );
                let error = SchedulerError::JobExecutionThrew {
                    job: job_name.clone(),
                    message: message.clone(),
                };
                scheduler.notify_scheduler_listeners_error(
                    &format!("job '{}' threw an unhandled error", job_name),
                    &error,
                );
                Some(JobExecutionError::new(format!(
                    "job threw an unhandled error: {}",
                    message
                )))
            }
        }
    }

    /// Ask the trigger for the completed-execution instruction. A panic
    /// inside the trigger is a bug in the trigger: it is reported and
    /// the instruction stays `Noop`.
    fn classify_completion(
        &self,
        scheduler: &Arc<dyn SchedulerRuntime>,
        job_error: Option<&JobExecutionError>,
    ) -> CompletedExecutionInstruction {
        let ctx = match self.ctx.as_ref() {
            Some(ctx) => ctx,
            None => return CompletedExecutionInstruction::Noop,
        };
        match catch_unwind(AssertUnwindSafe(|| {
            ctx.trigger().execution_complete(ctx, job_error)
        })) {
            Ok(instruction) => instruction,
            Err(panic) => {
                let message = panic_message(panic);
                let error = SchedulerError::TriggerThrew {
                    trigger: ctx.trigger().full_name(),
                    message,
                };
                tracing::error!(
                    trigger = %ctx.trigger().full_name(),
                    error = %error,
                    "trigger failed while classifying completed execution; this is a bug in the trigger"
                );
                scheduler.notify_scheduler_listeners_error(
                    "trigger failed while classifying completed execution",
                    &error,
                );
                CompletedExecutionInstruction::Noop
            }
        }
    }

    /// Report the firing's disposition to the store, entering the
    /// 5-second retry loop on persistence failures. Returns `false`
    /// only when shutdown aborted the retry loop.
    fn notify_job_store(
        &self,
        scheduler: &Arc<dyn SchedulerRuntime>,
        instruction: CompletedExecutionInstruction,
    ) -> bool {
        let ctx = match self.ctx.as_ref() {
            Some(ctx) => ctx,
            None => return true,
        };

        match scheduler.notify_job_store_job_complete(
            ctx,
            ctx.trigger(),
            ctx.job_detail(),
            instruction,
        ) {
            Ok(()) => true,
            Err(e) => {
                let retriable =
                    matches!(&e, SchedulerError::Store(store_err) if store_err.is_persistence());
                let message = format!(
                    "unable to report completed firing of trigger '{}' to the job store",
                    ctx.trigger().full_name()
                );
                scheduler.notify_scheduler_listeners_error(&message, &e);
                if retriable {
                    self.complete_trigger_retry_loop(scheduler, instruction)
                } else {
                    tracing::error!(
                        trigger = %ctx.trigger().full_name(),
                        error = %e,
                        "non-retriable store failure while completing firing"
                    );
                    true
                }
            }
        }
    }

    /// Retry the store notification every five seconds until it
    /// succeeds or shutdown is requested. The sleep is interruptible:
    /// a shutdown request wakes it and the flag is re-checked.
    fn complete_trigger_retry_loop(
        &self,
        scheduler: &Arc<dyn SchedulerRuntime>,
        instruction: CompletedExecutionInstruction,
    ) -> bool {
        let ctx = match self.ctx.as_ref() {
            Some(ctx) => ctx,
            None => return true,
        };

        loop {
            if self.shutdown.sleep_unless_requested(STORE_RETRY_INTERVAL) {
                tracing::warn!(
                    trigger = %ctx.trigger().full_name(),
                    "shutdown requested; abandoning store notification retries"
                );
                return false;
            }
            match scheduler.notify_job_store_job_complete(
                ctx,
                ctx.trigger(),
                ctx.job_detail(),
                instruction,
            ) {
                Ok(()) => return true,
                Err(e) => {
                    let retriable = matches!(
                        &e,
                        SchedulerError::Store(store_err) if store_err.is_persistence()
                    );
                    tracing::error!(
                        trigger = %ctx.trigger().full_name(),
                        error = %e,
                        "still unable to report completed firing to the job store"
                    );
                    if !retriable {
                        return true;
                    }
                }
            }
        }
    }

    fn describe(&self, what: &str) -> String {
        match self.ctx.as_ref() {
            Some(ctx) => format!("{} '{}'", what, ctx.trigger().full_name()),
            None => what.to_string(),
        }
    }
}

enum PreFire {
    Proceed,
    Abort,
    Vetoed,
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Listener traits and the notification bus.
//!
//! Triggers and job details carry listener *names*; resolution to
//! registered listeners happens here, at notification time. Global
//! listeners observe every trigger or job and are notified before the
//! named ones; within each group, order of registration is order of
//! notification.
//!
//! Error semantics follow the firing lifecycle: a failure in a
//! pre-execution notification aborts the firing (the bus surfaces it as
//! a [`SchedulerError::ListenerError`]); failures in post-execution and
//! scheduler-level notifications are logged and swallowed by the caller.

use std::sync::{Arc, PoisonError, RwLock};

use crate::core::job::JobExecutionError;
use crate::core::trigger::{CompletedExecutionInstruction, Trigger};
use crate::execution::JobExecutionContext;
use crate::scheduler::SchedulerError;

/// Error type listeners raise; wrapped by the bus with the listener's
/// name.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Observes the lifecycle of trigger firings. All notifications default
/// to no-ops so implementations override only what they watch.
pub trait TriggerListener: Send + Sync {
    /// The name triggers reference this listener by.
    fn name(&self) -> &str;

    /// The trigger fired; the job is about to be executed.
    fn trigger_fired(
        &self,
        _trigger: &Trigger,
        _ctx: &JobExecutionContext,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Decide whether to suppress this firing. Returning `true` vetoes
    /// the execution without marking it a failure.
    fn veto_job_execution(
        &self,
        _trigger: &Trigger,
        _ctx: &JobExecutionContext,
    ) -> Result<bool, ListenerError> {
        Ok(false)
    }

    /// A scheduled fire moment elapsed without delivery.
    fn trigger_misfired(&self, _trigger: &Trigger) -> Result<(), ListenerError> {
        Ok(())
    }

    /// The firing completed with the given instruction.
    fn trigger_complete(
        &self,
        _trigger: &Trigger,
        _ctx: &JobExecutionContext,
        _instruction: CompletedExecutionInstruction,
    ) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Observes job executions.
pub trait JobListener: Send + Sync {
    /// The name job details reference this listener by.
    fn name(&self) -> &str;

    /// The job is about to execute.
    fn job_to_be_executed(&self, _ctx: &JobExecutionContext) -> Result<(), ListenerError> {
        Ok(())
    }

    /// A trigger listener vetoed the execution.
    fn job_execution_vetoed(&self, _ctx: &JobExecutionContext) -> Result<(), ListenerError> {
        Ok(())
    }

    /// The job executed; `error` carries the domain failure if one was
    /// raised.
    fn job_was_executed(
        &self,
        _ctx: &JobExecutionContext,
        _error: Option<&JobExecutionError>,
    ) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Observes scheduler-level events. Notification is best effort and
/// infallible.
pub trait SchedulerListener: Send + Sync {
    /// An error surfaced during scheduling or execution.
    fn scheduler_error(&self, _message: &str, _error: &SchedulerError) {}

    /// A trigger reached a state from which it will never fire again.
    fn trigger_finalized(&self, _trigger: &Trigger) {}
}

/// Registry and dispatch for all three listener kinds.
pub struct ListenerManager {
    trigger_listeners: RwLock<Vec<Arc<dyn TriggerListener>>>,
    global_trigger_listeners: RwLock<Vec<Arc<dyn TriggerListener>>>,
    job_listeners: RwLock<Vec<Arc<dyn JobListener>>>,
    global_job_listeners: RwLock<Vec<Arc<dyn JobListener>>>,
    scheduler_listeners: RwLock<Vec<Arc<dyn SchedulerListener>>>,
}

impl ListenerManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            trigger_listeners: RwLock::new(Vec::new()),
            global_trigger_listeners: RwLock::new(Vec::new()),
            job_listeners: RwLock::new(Vec::new()),
            global_job_listeners: RwLock::new(Vec::new()),
            scheduler_listeners: RwLock::new(Vec::new()),
        }
    }

    // --- registration ------------------------------------------------

    /// Register a named trigger listener. A listener with the same name
    /// is replaced.
    pub fn add_trigger_listener(&self, listener: Arc<dyn TriggerListener>) {
        let mut listeners = self
            .trigger_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = listeners.iter_mut().find(|l| l.name() == listener.name()) {
            *existing = listener;
        } else {
            listeners.push(listener);
        }
    }

    /// Register a trigger listener notified for every trigger.
    pub fn add_global_trigger_listener(&self, listener: Arc<dyn TriggerListener>) {
        self.global_trigger_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove a named trigger listener. Returns whether it was present.
    pub fn remove_trigger_listener(&self, name: &str) -> bool {
        let mut listeners = self
            .trigger_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match listeners.iter().position(|l| l.name() == name) {
            Some(idx) => {
                listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Register a named job listener. A listener with the same name is
    /// replaced.
    pub fn add_job_listener(&self, listener: Arc<dyn JobListener>) {
        let mut listeners = self
            .job_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = listeners.iter_mut().find(|l| l.name() == listener.name()) {
            *existing = listener;
        } else {
            listeners.push(listener);
        }
    }

    /// Register a job listener notified for every job.
    pub fn add_global_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.global_job_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove a named job listener. Returns whether it was present.
    pub fn remove_job_listener(&self, name: &str) -> bool {
        let mut listeners = self
            .job_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match listeners.iter().position(|l| l.name() == name) {
            Some(idx) => {
                listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Register a scheduler listener.
    pub fn add_scheduler_listener(&self, listener: Arc<dyn SchedulerListener>) {
        self.scheduler_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    // --- resolution --------------------------------------------------

    /// Globals first, then the named listeners in the order the trigger
    /// lists them. An unregistered name is an error.
    fn resolve_trigger_listeners(
        &self,
        names: &[String],
    ) -> Result<Vec<Arc<dyn TriggerListener>>, SchedulerError> {
        let mut resolved: Vec<Arc<dyn TriggerListener>> = self
            .global_trigger_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let named = self
            .trigger_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for name in names {
            let listener = named
                .iter()
                .find(|l| l.name() == name)
                .cloned()
                .ok_or_else(|| SchedulerError::UnknownListener(name.clone()))?;
            resolved.push(listener);
        }
        Ok(resolved)
    }

    fn resolve_job_listeners(
        &self,
        names: &[String],
    ) -> Result<Vec<Arc<dyn JobListener>>, SchedulerError> {
        let mut resolved: Vec<Arc<dyn JobListener>> = self
            .global_job_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let named = self
            .job_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for name in names {
            let listener = named
                .iter()
                .find(|l| l.name() == name)
                .cloned()
                .ok_or_else(|| SchedulerError::UnknownListener(name.clone()))?;
            resolved.push(listener);
        }
        Ok(resolved)
    }

    // --- dispatch ----------------------------------------------------

    /// Notify trigger listeners of the fire and collect veto decisions.
    /// Returns whether any listener vetoed.
    pub fn notify_trigger_listeners_fired(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<bool, SchedulerError> {
        let listeners = self.resolve_trigger_listeners(ctx.trigger().trigger_listener_names())?;
        let mut vetoed = false;
        for listener in listeners {
            listener
                .trigger_fired(ctx.trigger(), ctx)
                .map_err(|e| SchedulerError::ListenerError {
                    listener: listener.name().to_string(),
                    source: e,
                })?;
            let veto = listener
                .veto_job_execution(ctx.trigger(), ctx)
                .map_err(|e| SchedulerError::ListenerError {
                    listener: listener.name().to_string(),
                    source: e,
                })?;
            if veto {
                vetoed = true;
            }
        }
        Ok(vetoed)
    }

    /// Notify trigger listeners of the completed firing.
    pub fn notify_trigger_listeners_complete(
        &self,
        ctx: &JobExecutionContext,
        instruction: CompletedExecutionInstruction,
    ) -> Result<(), SchedulerError> {
        let listeners = self.resolve_trigger_listeners(ctx.trigger().trigger_listener_names())?;
        for listener in listeners {
            listener
                .trigger_complete(ctx.trigger(), ctx, instruction)
                .map_err(|e| SchedulerError::ListenerError {
                    listener: listener.name().to_string(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Notify trigger listeners a fire moment was missed.
    pub fn notify_trigger_listeners_misfired(
        &self,
        trigger: &Trigger,
    ) -> Result<(), SchedulerError> {
        let listeners = self.resolve_trigger_listeners(trigger.trigger_listener_names())?;
        for listener in listeners {
            listener
                .trigger_misfired(trigger)
                .map_err(|e| SchedulerError::ListenerError {
                    listener: listener.name().to_string(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Notify job listeners execution is imminent.
    pub fn notify_job_listeners_to_be_executed(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError> {
        let listeners = self.resolve_job_listeners(ctx.job_detail().listener_names())?;
        for listener in listeners {
            listener
                .job_to_be_executed(ctx)
                .map_err(|e| SchedulerError::ListenerError {
                    listener: listener.name().to_string(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Notify job listeners the execution was vetoed.
    pub fn notify_job_listeners_was_vetoed(
        &self,
        ctx: &JobExecutionContext,
    ) -> Result<(), SchedulerError> {
        let listeners = self.resolve_job_listeners(ctx.job_detail().listener_names())?;
        for listener in listeners {
            listener
                .job_execution_vetoed(ctx)
                .map_err(|e| SchedulerError::ListenerError {
                    listener: listener.name().to_string(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Notify job listeners the execution finished.
    pub fn notify_job_listeners_was_executed(
        &self,
        ctx: &JobExecutionContext,
        error: Option<&JobExecutionError>,
    ) -> Result<(), SchedulerError> {
        let listeners = self.resolve_job_listeners(ctx.job_detail().listener_names())?;
        for listener in listeners {
            listener
                .job_was_executed(ctx, error)
                .map_err(|e| SchedulerError::ListenerError {
                    listener: listener.name().to_string(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Report an error to every scheduler listener. Best effort.
    pub fn notify_scheduler_listeners_error(&self, message: &str, error: &SchedulerError) {
        let listeners = self
            .scheduler_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.scheduler_error(message, error);
        }
    }

    /// Report a finalized trigger to every scheduler listener. Best
    /// effort.
    pub fn notify_scheduler_listeners_finalized(&self, trigger: &Trigger) {
        let listeners = self
            .scheduler_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.trigger_finalized(trigger);
        }
    }
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}

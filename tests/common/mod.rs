//! Common test utilities shared across integration tests.

use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use firetime::testing::{
    CollectingShellFactory, InMemoryJobStore, RecordingSchedulerListener, SimpleJobFactory,
};
use firetime::{
    ExecutionHooks, FiredTriggerBundle, Job, JobDetail, JobDetailBuilder, JobRunShell,
    RepeatCount, SchedulerCore, SchedulerError, SchedulerListener, SchedulerRuntime,
    SimpleSchedule, Trigger, TriggerBuilder, TriggerSchedule,
};

/// A trigger that fires once, starting now.
pub fn one_shot_trigger(name: &str, job: &str) -> Trigger {
    TriggerBuilder::new(name, job, TriggerSchedule::Simple(SimpleSchedule::once()))
        .build()
        .unwrap()
}

/// A trigger that repeats every minute, indefinitely.
pub fn repeating_trigger(name: &str, job: &str) -> Trigger {
    let schedule =
        SimpleSchedule::new(Duration::from_secs(60), RepeatCount::Indefinite).unwrap();
    TriggerBuilder::new(name, job, TriggerSchedule::Simple(schedule))
        .build()
        .unwrap()
}

/// A minimal detail for the given job name, in the default group.
pub fn detail_for(job: &str) -> JobDetail {
    JobDetailBuilder::new(job).build().unwrap()
}

/// Build the bundle the scheduler's decision loop would hand to a
/// shell: first fire computed, trigger advanced past it.
pub fn bundle_for(trigger: &Trigger, detail: &JobDetail) -> FiredTriggerBundle {
    let mut fired = trigger.clone();
    let scheduled = fired.compute_first_fire_time(None);
    let previous = fired.previous_fire_time();
    fired.triggered(None);
    let next = fired.next_fire_time();
    FiredTriggerBundle::new(
        detail.clone(),
        fired,
        None,
        false,
        Utc::now(),
        scheduled,
        previous,
        next,
    )
}

/// Execution hooks that record every begin/complete call.
pub struct RecordingHooks {
    begins: Arc<AtomicU32>,
    completes: Arc<Mutex<Vec<bool>>>,
}

/// Shared handle to inspect a [`RecordingHooks`] after the shell
/// consumed it.
#[derive(Clone)]
pub struct HookProbe {
    begins: Arc<AtomicU32>,
    completes: Arc<Mutex<Vec<bool>>>,
}

impl RecordingHooks {
    pub fn new() -> (Self, HookProbe) {
        let begins = Arc::new(AtomicU32::new(0));
        let completes = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                begins: Arc::clone(&begins),
                completes: Arc::clone(&completes),
            },
            HookProbe { begins, completes },
        )
    }
}

impl ExecutionHooks for RecordingHooks {
    fn begin(&mut self) -> Result<(), SchedulerError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn complete(&mut self, successful: bool) -> Result<(), SchedulerError> {
        self.completes.lock().unwrap().push(successful);
        Ok(())
    }
}

impl HookProbe {
    pub fn begins(&self) -> u32 {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn completes(&self) -> Vec<bool> {
        self.completes.lock().unwrap().clone()
    }
}

/// A facade wired with doubles, plus handles to everything a test
/// inspects afterwards.
pub struct TestScheduler {
    pub core: Arc<SchedulerCore>,
    pub store: Arc<InMemoryJobStore>,
    pub shells: Arc<CollectingShellFactory>,
    pub scheduler_events: Arc<RecordingSchedulerListener>,
}

impl TestScheduler {
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self::with_store(job, Arc::new(InMemoryJobStore::new()))
    }

    pub fn with_store(job: Arc<dyn Job>, store: Arc<InMemoryJobStore>) -> Self {
        let job_factory: Arc<dyn firetime::JobFactory> = Arc::new(SimpleJobFactory::new(job));
        let job_store: Arc<dyn firetime::JobStore> = Arc::clone(&store) as Arc<dyn firetime::JobStore>;
        let core = Arc::new(SchedulerCore::new(job_factory, job_store));
        let scheduler_events = Arc::new(RecordingSchedulerListener::new());
        core.listeners()
            .add_scheduler_listener(Arc::clone(&scheduler_events) as Arc<dyn SchedulerListener>);
        Self {
            core,
            store,
            shells: Arc::new(CollectingShellFactory::new()),
            scheduler_events,
        }
    }

    /// An initialized shell for the bundle.
    pub fn shell(&self, bundle: FiredTriggerBundle) -> JobRunShell {
        let runtime: Arc<dyn SchedulerRuntime> = Arc::clone(&self.core) as Arc<dyn SchedulerRuntime>;
        let factory: Arc<dyn firetime::JobRunShellFactory> =
            Arc::clone(&self.shells) as Arc<dyn firetime::JobRunShellFactory>;
        let mut shell = JobRunShell::new(runtime, factory);
        shell.initialize(bundle).unwrap();
        shell
    }

    /// An initialized shell with the given hooks installed.
    pub fn shell_with_hooks(
        &self,
        bundle: FiredTriggerBundle,
        hooks: Box<dyn ExecutionHooks>,
    ) -> JobRunShell {
        let runtime: Arc<dyn SchedulerRuntime> = Arc::clone(&self.core) as Arc<dyn SchedulerRuntime>;
        let factory: Arc<dyn firetime::JobRunShellFactory> =
            Arc::clone(&self.shells) as Arc<dyn firetime::JobRunShellFactory>;
        let mut shell = JobRunShell::new(runtime, factory).with_hooks(hooks);
        shell.initialize(bundle).unwrap();
        shell
    }
}

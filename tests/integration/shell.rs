//! End-to-end firings through the job run shell.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use firetime::testing::{
    CountingJob, FailingJobFactory, InMemoryJobStore, PanickingJob, RecordingJobListener,
    RecordingTriggerListener,
};
use firetime::{
    CompletedExecutionInstruction, Job, JobExecutionContext, JobExecutionError, JobRunShell,
    JobRunShellFactory, ListenerError, SchedulerRuntime, Trigger, TriggerListener,
};

use crate::common::{
    bundle_for, detail_for, one_shot_trigger, repeating_trigger, RecordingHooks, TestScheduler,
};

#[test]
fn test_happy_path_runs_job_once_and_reports_noop() {
    let job = Arc::new(CountingJob::new());
    let scheduler = TestScheduler::new(job.clone());

    let trigger_listener = Arc::new(RecordingTriggerListener::new("audit"));
    scheduler
        .core
        .listeners()
        .add_trigger_listener(trigger_listener.clone());
    let job_listener = Arc::new(RecordingJobListener::new("watch"));
    scheduler
        .core
        .listeners()
        .add_global_job_listener(job_listener.clone());

    let mut trigger = repeating_trigger("t", "j");
    trigger.add_trigger_listener("audit");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    assert!(shell.run());

    assert_eq!(job.executions(), 1);
    assert_eq!(trigger_listener.fired_count(), 1);
    assert_eq!(job_listener.to_be_executed_count(), 1);
    assert_eq!(job_listener.executed(), [None]);
    assert_eq!(
        trigger_listener.completions(),
        [CompletedExecutionInstruction::Noop]
    );

    let completions = scheduler.store.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(
        completions[0].instruction,
        CompletedExecutionInstruction::Noop
    );

    // the shell woke the scheduler thread and went back to its pool
    assert!(scheduler.core.signal().wait_timeout(Duration::ZERO));
    assert_eq!(scheduler.shells.returned_count(), 1);
    assert!(scheduler.scheduler_events.errors().is_empty());
}

#[test]
fn test_exhausted_trigger_reports_complete_and_finalizes() {
    let job = Arc::new(CountingJob::new());
    let scheduler = TestScheduler::new(job.clone());

    let trigger = one_shot_trigger("once", "j");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    assert!(shell.run());

    let completions = scheduler.store.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(
        completions[0].instruction,
        CompletedExecutionInstruction::SetTriggerComplete
    );
    assert_eq!(
        scheduler.scheduler_events.finalized(),
        [trigger.key()]
    );
}

#[test]
fn test_veto_suppresses_execution_but_finalizes() {
    let job = Arc::new(CountingJob::new());
    let scheduler = TestScheduler::new(job.clone());

    scheduler
        .core
        .listeners()
        .add_trigger_listener(Arc::new(RecordingTriggerListener::vetoing("gate")));
    let job_listener = Arc::new(RecordingJobListener::new("watch"));
    scheduler
        .core
        .listeners()
        .add_global_job_listener(job_listener.clone());

    let mut trigger = repeating_trigger("t", "j");
    trigger.add_trigger_listener("gate");
    let detail = detail_for("j");

    let (hooks, probe) = RecordingHooks::new();
    let shell = scheduler.shell_with_hooks(bundle_for(&trigger, &detail), Box::new(hooks));
    assert!(shell.run());

    // the job never ran, job listeners heard about the veto
    assert_eq!(job.executions(), 0);
    assert_eq!(job_listener.vetoed_count(), 1);
    assert_eq!(job_listener.to_be_executed_count(), 0);
    assert!(job_listener.executed().is_empty());

    // the pass still finalized, but nothing reached the store
    assert_eq!(probe.begins(), 1);
    assert_eq!(probe.completes(), [true]);
    assert!(scheduler.store.completions().is_empty());
    assert_eq!(scheduler.shells.returned_count(), 1);
}

#[test]
fn test_panicking_job_is_captured_and_reported() {
    let job = Arc::new(PanickingJob::new("boom"));
    let scheduler = TestScheduler::new(job);

    let job_listener = Arc::new(RecordingJobListener::new("watch"));
    scheduler
        .core
        .listeners()
        .add_global_job_listener(job_listener.clone());

    let trigger = repeating_trigger("t", "j");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    assert!(shell.run());

    // scheduler listeners received the unhandled-error report
    let errors = scheduler.scheduler_events.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("threw an unhandled error"));
    assert!(errors[0].contains("boom"));

    // post-listeners still fired, with the synthesized job error
    let executed = job_listener.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].as_deref().unwrap().contains("boom"));

    // the synthesized error does not request a refire, so the firing
    // completes normally
    let completions = scheduler.store.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(
        completions[0].instruction,
        CompletedExecutionInstruction::Noop
    );
}

/// Requests two immediate re-executions and records the refire count
/// observed on each pass.
struct RefireProbeJob {
    refires: u32,
    observed: Mutex<Vec<u32>>,
}

impl RefireProbeJob {
    fn new(refires: u32) -> Self {
        Self {
            refires,
            observed: Mutex::new(Vec::new()),
        }
    }

    fn observed(&self) -> Vec<u32> {
        self.observed.lock().unwrap().clone()
    }
}

impl Job for RefireProbeJob {
    fn execute(&self, ctx: &mut JobExecutionContext) -> Result<(), JobExecutionError> {
        let mut observed = self.observed.lock().unwrap();
        observed.push(ctx.refire_count());
        if (observed.len() as u32) <= self.refires {
            Err(JobExecutionError::new("not yet").with_refire_immediately())
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_re_execute_runs_same_context_without_releasing_worker() {
    let job = Arc::new(RefireProbeJob::new(2));
    let scheduler = TestScheduler::new(job.clone());

    let trigger_listener = Arc::new(RecordingTriggerListener::new("audit"));
    scheduler
        .core
        .listeners()
        .add_trigger_listener(trigger_listener.clone());

    let mut trigger = repeating_trigger("t", "j");
    trigger.add_trigger_listener("audit");
    let detail = detail_for("j");

    let (hooks, probe) = RecordingHooks::new();
    let shell = scheduler.shell_with_hooks(bundle_for(&trigger, &detail), Box::new(hooks));
    assert!(shell.run());

    // three passes on the same context: refire count grows across them
    assert_eq!(job.observed(), [0, 1, 2]);
    assert_eq!(
        trigger_listener.completions(),
        [
            CompletedExecutionInstruction::ReExecuteJob,
            CompletedExecutionInstruction::ReExecuteJob,
            CompletedExecutionInstruction::Noop,
        ]
    );
    assert_eq!(probe.completes(), [false, false, true]);
    assert_eq!(probe.begins(), 3);

    // only the terminal completion reached the store
    assert_eq!(scheduler.store.completions().len(), 1);
    assert_eq!(scheduler.shells.returned_count(), 1);
}

#[test]
fn test_persistence_failure_retries_until_shutdown() {
    let job = Arc::new(CountingJob::new());
    let store = Arc::new(InMemoryJobStore::always_failing());
    let scheduler = TestScheduler::with_store(job, store.clone());

    let trigger = repeating_trigger("t", "j");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    let shutdown = shell.shutdown_handle();

    let worker = thread::spawn(move || shell.run());
    thread::sleep(Duration::from_millis(100));
    shutdown.request_shutdown();

    // shutdown aborts the retry loop: run reports the firing was never
    // persisted
    assert!(!worker.join().unwrap());
    assert_eq!(store.attempts(), 1);
    assert!(store.completions().is_empty());
    assert_eq!(scheduler.shells.returned_count(), 1);
    assert!(!scheduler.scheduler_events.errors().is_empty());
}

#[test]
fn test_persistence_retry_eventually_succeeds() {
    let job = Arc::new(CountingJob::new());
    let store = Arc::new(InMemoryJobStore::failing_times(1));
    let scheduler = TestScheduler::with_store(job, store.clone());

    let trigger = repeating_trigger("t", "j");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    let worker = thread::spawn(move || shell.run());

    // first attempt fails, the 5-second retry succeeds
    assert!(worker.join().unwrap());
    assert_eq!(store.attempts(), 2);
    assert_eq!(store.completions().len(), 1);
}

#[test]
fn test_failing_pre_listener_aborts_firing() {
    struct BrokenListener;
    impl TriggerListener for BrokenListener {
        fn name(&self) -> &str {
            "broken"
        }
        fn trigger_fired(
            &self,
            _trigger: &Trigger,
            _ctx: &JobExecutionContext,
        ) -> Result<(), ListenerError> {
            Err("no notifications today".into())
        }
    }

    let job = Arc::new(CountingJob::new());
    let scheduler = TestScheduler::new(job.clone());
    scheduler
        .core
        .listeners()
        .add_trigger_listener(Arc::new(BrokenListener));

    let mut trigger = repeating_trigger("t", "j");
    trigger.add_trigger_listener("broken");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    assert!(shell.run());

    // the job never ran and nothing reached the store, but the error
    // was reported and the shell still came home
    assert_eq!(job.executions(), 0);
    assert!(scheduler.store.completions().is_empty());
    assert!(!scheduler.scheduler_events.errors().is_empty());
    assert_eq!(scheduler.shells.returned_count(), 1);
}

#[test]
fn test_job_factory_failure_is_reported() {
    let store: Arc<dyn firetime::JobStore> = Arc::new(InMemoryJobStore::new());
    let factory: Arc<dyn firetime::JobFactory> =
        Arc::new(FailingJobFactory::new("no such job class"));
    let core = Arc::new(firetime::SchedulerCore::new(factory, store));
    let events = Arc::new(firetime::testing::RecordingSchedulerListener::new());
    core.listeners().add_scheduler_listener(events.clone());

    let runtime: Arc<dyn SchedulerRuntime> = core;
    let shells: Arc<dyn JobRunShellFactory> =
        Arc::new(firetime::testing::CollectingShellFactory::new());
    let mut shell = JobRunShell::new(runtime, shells);

    let trigger = repeating_trigger("t", "j");
    let detail = detail_for("j");
    let result = shell.initialize(bundle_for(&trigger, &detail));

    assert!(result.is_err());
    let errors = events.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("unable to instantiate job"));
}

/// Mutations made by one pass are visible to the next pass of the same
/// firing.
struct AccumulatingJob {
    total: AtomicU32,
}

impl Job for AccumulatingJob {
    fn execute(&self, ctx: &mut JobExecutionContext) -> Result<(), JobExecutionError> {
        let so_far: u32 = ctx.job_data().get("acc").unwrap_or(0);
        ctx.job_data_mut().insert("acc", so_far + 1);
        self.total.store(so_far + 1, Ordering::SeqCst);
        if so_far + 1 < 3 {
            Err(JobExecutionError::new("again").with_refire_immediately())
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_context_mutations_survive_re_execution() {
    let job = Arc::new(AccumulatingJob {
        total: AtomicU32::new(0),
    });
    let scheduler = TestScheduler::new(job.clone());

    let trigger = repeating_trigger("t", "j");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    assert!(shell.run());

    assert_eq!(job.total.load(Ordering::SeqCst), 3);
}

#[test]
fn test_job_error_can_unschedule_firing_trigger() {
    let job = Arc::new(firetime::testing::FailingJob::with_error(|| {
        JobExecutionError::new("stop this trigger").with_unschedule_firing_trigger()
    }));
    let scheduler = TestScheduler::new(job);

    let trigger = repeating_trigger("t", "j");
    let detail = detail_for("j");

    let shell = scheduler.shell(bundle_for(&trigger, &detail));
    assert!(shell.run());

    let completions = scheduler.store.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(
        completions[0].instruction,
        CompletedExecutionInstruction::SetTriggerComplete
    );
}

//! Per-fire execution context handed to the job and to listeners.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::bundle::FiredTriggerBundle;
use crate::core::data_map::JobDataMap;
use crate::core::job::{Job, JobDetail};
use crate::core::trigger::Trigger;
use crate::scheduler::SchedulerRuntime;

/// The bundle of everything one firing carries: the scheduler handle,
/// the trigger and job detail, the instantiated job, the merged data
/// map, the fire-time snapshots, and per-execution bookkeeping.
///
/// Owned by exactly one shell; jobs receive it mutably and may read the
/// merged data map, but mutations are not re-persisted.
pub struct JobExecutionContext {
    scheduler: Arc<dyn SchedulerRuntime>,
    trigger: Trigger,
    job_detail: JobDetail,
    job_instance: Arc<dyn Job>,
    merged_job_data: JobDataMap,
    recovering: bool,
    refire_count: u32,
    fire_time: DateTime<Utc>,
    scheduled_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
    next_fire_time: Option<DateTime<Utc>>,
    job_run_time: Option<Duration>,
}

impl JobExecutionContext {
    /// Build a fresh context from a fired bundle and the job instance
    /// the factory produced for it.
    pub fn new(
        scheduler: Arc<dyn SchedulerRuntime>,
        bundle: FiredTriggerBundle,
        job_instance: Arc<dyn Job>,
    ) -> Self {
        let (
            job_detail,
            trigger,
            recovering,
            fire_time,
            scheduled_fire_time,
            previous_fire_time,
            next_fire_time,
        ) = bundle.into_parts();

        // trigger entries override job entries in the merged view
        let merged_job_data = match trigger.job_data_ref() {
            Some(overrides) => job_detail.job_data().merged(overrides),
            None => job_detail.job_data().clone(),
        };

        Self {
            scheduler,
            trigger,
            job_detail,
            job_instance,
            merged_job_data,
            recovering,
            refire_count: 0,
            fire_time,
            scheduled_fire_time,
            previous_fire_time,
            next_fire_time,
            job_run_time: None,
        }
    }

    /// Handle to the scheduler surface that fired this execution.
    pub fn scheduler(&self) -> &Arc<dyn SchedulerRuntime> {
        &self.scheduler
    }

    /// The trigger that fired.
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// The fired job's detail.
    pub fn job_detail(&self) -> &JobDetail {
        &self.job_detail
    }

    /// The job instance executing this firing.
    pub fn job_instance(&self) -> Arc<dyn Job> {
        Arc::clone(&self.job_instance)
    }

    /// The merged job data map (job entries overlaid with trigger
    /// entries). Mutations live only for this execution.
    pub fn job_data(&self) -> &JobDataMap {
        &self.merged_job_data
    }

    /// Mutable access to the merged data map, e.g. to carry state across
    /// immediate re-executions.
    pub fn job_data_mut(&mut self) -> &mut JobDataMap {
        &mut self.merged_job_data
    }

    /// Whether this firing recovers an interrupted execution.
    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    /// How many times the trigger requested immediate re-execution
    /// within this shell run.
    pub fn refire_count(&self) -> u32 {
        self.refire_count
    }

    pub(crate) fn increment_refire_count(&mut self) {
        self.refire_count += 1;
    }

    /// The actual fire instant.
    pub fn fire_time(&self) -> DateTime<Utc> {
        self.fire_time
    }

    /// The instant the schedule had planned for this fire.
    pub fn scheduled_fire_time(&self) -> Option<DateTime<Utc>> {
        self.scheduled_fire_time
    }

    /// The trigger's previous fire time, snapshotted at selection.
    pub fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        self.previous_fire_time
    }

    /// The trigger's next fire time, snapshotted at selection.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    /// Wall-clock duration of the most recent execution pass, unset
    /// until the job has run.
    pub fn job_run_time(&self) -> Option<Duration> {
        self.job_run_time
    }

    pub(crate) fn set_job_run_time(&mut self, elapsed: Duration) {
        self.job_run_time = Some(elapsed);
    }
}

impl fmt::Debug for JobExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobExecutionContext")
            .field("trigger", &self.trigger.full_name())
            .field("job", &self.job_detail.key().full_name())
            .field("recovering", &self.recovering)
            .field("refire_count", &self.refire_count)
            .field("fire_time", &self.fire_time)
            .field("scheduled_fire_time", &self.scheduled_fire_time)
            .field("job_run_time", &self.job_run_time)
            .finish()
    }
}

//! The packet handed from the scheduler's decision loop to a run shell.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::calendar::Calendar;
use crate::core::job::JobDetail;
use crate::core::trigger::Trigger;

/// Everything a shell needs to execute one firing decision: the trigger
/// (already advanced past this fire by the store), its job detail, the
/// resolved calendar, and the fire-time snapshots taken at selection
/// time.
pub struct FiredTriggerBundle {
    job_detail: JobDetail,
    trigger: Trigger,
    calendar: Option<Arc<dyn Calendar>>,
    job_is_recovering: bool,
    fire_time: DateTime<Utc>,
    scheduled_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
    next_fire_time: Option<DateTime<Utc>>,
}

impl FiredTriggerBundle {
    /// Assemble a bundle. Produced by the job store when a trigger is
    /// selected for firing.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_detail: JobDetail,
        trigger: Trigger,
        calendar: Option<Arc<dyn Calendar>>,
        job_is_recovering: bool,
        fire_time: DateTime<Utc>,
        scheduled_fire_time: Option<DateTime<Utc>>,
        previous_fire_time: Option<DateTime<Utc>>,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            job_detail,
            trigger,
            calendar,
            job_is_recovering,
            fire_time,
            scheduled_fire_time,
            previous_fire_time,
            next_fire_time,
        }
    }

    /// The fired job's detail.
    pub fn job_detail(&self) -> &JobDetail {
        &self.job_detail
    }

    /// The trigger that fired.
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// The calendar masking the trigger, if any.
    pub fn calendar(&self) -> Option<&Arc<dyn Calendar>> {
        self.calendar.as_ref()
    }

    /// Whether this firing recovers an execution interrupted by process
    /// death.
    pub fn job_is_recovering(&self) -> bool {
        self.job_is_recovering
    }

    /// The actual fire instant.
    pub fn fire_time(&self) -> DateTime<Utc> {
        self.fire_time
    }

    /// The instant the schedule had planned, which may precede the
    /// actual fire time.
    pub fn scheduled_fire_time(&self) -> Option<DateTime<Utc>> {
        self.scheduled_fire_time
    }

    /// The trigger's previous fire time at selection.
    pub fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        self.previous_fire_time
    }

    /// The trigger's next fire time at selection.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        JobDetail,
        Trigger,
        bool,
        DateTime<Utc>,
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
    ) {
        (
            self.job_detail,
            self.trigger,
            self.job_is_recovering,
            self.fire_time,
            self.scheduled_fire_time,
            self.previous_fire_time,
            self.next_fire_time,
        )
    }
}

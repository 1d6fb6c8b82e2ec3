//! Concrete fire-time schedules.
//!
//! The schedule kinds form a closed sum type, [`TriggerSchedule`], that
//! dispatches the [`FireSchedule`] contract to the active variant. The
//! trigger base stores this enum so triggers of different kinds stay
//! directly comparable and persistable.

pub mod cron;
pub mod simple;

pub use cron::CronSchedule;
pub use simple::{RepeatCount, SimpleSchedule};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::calendar::Calendar;
use crate::core::trigger::{FireSchedule, FireWindow};

/// The schedule kinds a trigger can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerSchedule {
    /// Fixed-interval schedule.
    Simple(SimpleSchedule),
    /// Cron-expression schedule.
    Cron(CronSchedule),
}

impl From<SimpleSchedule> for TriggerSchedule {
    fn from(schedule: SimpleSchedule) -> Self {
        TriggerSchedule::Simple(schedule)
    }
}

impl From<CronSchedule> for TriggerSchedule {
    fn from(schedule: CronSchedule) -> Self {
        TriggerSchedule::Cron(schedule)
    }
}

impl FireSchedule for TriggerSchedule {
    fn compute_first_fire_time(
        &mut self,
        window: &FireWindow,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        match self {
            TriggerSchedule::Simple(s) => s.compute_first_fire_time(window, calendar),
            TriggerSchedule::Cron(s) => s.compute_first_fire_time(window, calendar),
        }
    }

    fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        match self {
            TriggerSchedule::Simple(s) => s.next_fire_time(),
            TriggerSchedule::Cron(s) => s.next_fire_time(),
        }
    }

    fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        match self {
            TriggerSchedule::Simple(s) => s.previous_fire_time(),
            TriggerSchedule::Cron(s) => s.previous_fire_time(),
        }
    }

    fn fire_time_after(
        &self,
        window: &FireWindow,
        after: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        match self {
            TriggerSchedule::Simple(s) => s.fire_time_after(window, after),
            TriggerSchedule::Cron(s) => s.fire_time_after(window, after),
        }
    }

    fn final_fire_time(&self, window: &FireWindow) -> Option<DateTime<Utc>> {
        match self {
            TriggerSchedule::Simple(s) => s.final_fire_time(window),
            TriggerSchedule::Cron(s) => s.final_fire_time(window),
        }
    }

    fn may_fire_again(&self) -> bool {
        match self {
            TriggerSchedule::Simple(s) => s.may_fire_again(),
            TriggerSchedule::Cron(s) => s.may_fire_again(),
        }
    }

    fn validate_misfire_instruction(&self, instruction: i32) -> bool {
        match self {
            TriggerSchedule::Simple(s) => s.validate_misfire_instruction(instruction),
            TriggerSchedule::Cron(s) => s.validate_misfire_instruction(instruction),
        }
    }

    fn triggered(&mut self, window: &FireWindow, calendar: Option<&dyn Calendar>) {
        match self {
            TriggerSchedule::Simple(s) => s.triggered(window, calendar),
            TriggerSchedule::Cron(s) => s.triggered(window, calendar),
        }
    }

    fn update_after_misfire(
        &mut self,
        window: &FireWindow,
        calendar: Option<&dyn Calendar>,
        instruction: i32,
    ) {
        match self {
            TriggerSchedule::Simple(s) => s.update_after_misfire(window, calendar, instruction),
            TriggerSchedule::Cron(s) => s.update_after_misfire(window, calendar, instruction),
        }
    }

    fn update_with_new_calendar(
        &mut self,
        window: &FireWindow,
        calendar: &dyn Calendar,
        misfire_threshold: Duration,
    ) {
        match self {
            TriggerSchedule::Simple(s) => {
                s.update_with_new_calendar(window, calendar, misfire_threshold)
            }
            TriggerSchedule::Cron(s) => {
                s.update_with_new_calendar(window, calendar, misfire_threshold)
            }
        }
    }

    fn has_millisecond_precision(&self) -> bool {
        match self {
            TriggerSchedule::Simple(s) => s.has_millisecond_precision(),
            TriggerSchedule::Cron(s) => s.has_millisecond_precision(),
        }
    }
}

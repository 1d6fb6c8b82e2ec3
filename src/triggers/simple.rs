//! Fixed-interval schedule: fire at the start time, then every
//! `repeat_interval`, a finite or indefinite number of times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::calendar::Calendar;
use crate::core::trigger::{
    FireSchedule, FireWindow, TriggerError, MISFIRE_INSTRUCTION_SMART_POLICY,
};

/// Misfire handling: fire immediately, once. Only meaningful for
/// one-shot schedules; repeating schedules degrade to
/// [`MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_REMAINING_REPEAT_COUNT`].
pub const MISFIRE_INSTRUCTION_FIRE_NOW: i32 = 1;

/// Misfire handling: restart the series now, keeping the configured
/// repeat count.
pub const MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_EXISTING_REPEAT_COUNT: i32 = 2;

/// Misfire handling: restart the series now with the repeats left after
/// discounting the missed fires.
pub const MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_REMAINING_REPEAT_COUNT: i32 = 3;

/// Misfire handling: skip to the next fire time in the original series,
/// counting the missed fires as triggered.
pub const MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_REMAINING_COUNT: i32 = 4;

/// Misfire handling: skip to the next fire time in the original series,
/// keeping the existing trigger count.
pub const MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_EXISTING_COUNT: i32 = 5;

/// How many times the schedule repeats after its first fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatCount {
    /// Repeat exactly this many times (0 = fire once).
    Finite(u32),
    /// Repeat until the end of the fire window, forever if unbounded.
    Indefinite,
}

/// A fixed-interval fire-time schedule.
///
/// The series origin is the trigger's start time until a
/// reschedule-now misfire rebases it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleSchedule {
    #[serde(with = "serde_duration")]
    repeat_interval: Duration,
    repeat_count: RepeatCount,
    times_triggered: u32,
    anchor: Option<DateTime<Utc>>,
    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

impl SimpleSchedule {
    /// Create a repeating schedule. The interval must be positive and
    /// representable in milliseconds.
    pub fn new(repeat_interval: Duration, repeat_count: RepeatCount) -> Result<Self, TriggerError> {
        if repeat_interval.is_zero() || repeat_interval.as_millis() > i64::MAX as u128 {
            return Err(TriggerError::NonPositiveInterval);
        }
        Ok(Self {
            repeat_interval,
            repeat_count,
            times_triggered: 0,
            anchor: None,
            next_fire_time: None,
            previous_fire_time: None,
        })
    }

    /// A schedule that fires exactly once, at the start time.
    pub fn once() -> Self {
        Self {
            repeat_interval: Duration::from_secs(1),
            repeat_count: RepeatCount::Finite(0),
            times_triggered: 0,
            anchor: None,
            next_fire_time: None,
            previous_fire_time: None,
        }
    }

    /// The configured interval between fires.
    pub fn repeat_interval(&self) -> Duration {
        self.repeat_interval
    }

    /// The configured repeat count.
    pub fn repeat_count(&self) -> RepeatCount {
        self.repeat_count
    }

    /// How many times this schedule has fired.
    pub fn times_triggered(&self) -> u32 {
        self.times_triggered
    }

    fn interval_ms(&self) -> i64 {
        self.repeat_interval.as_millis().min(i64::MAX as u128) as i64
    }

    fn series_origin(&self, window: &FireWindow) -> DateTime<Utc> {
        self.anchor.unwrap_or(window.start)
    }

    fn bounded(&self, window: &FireWindow, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match window.end {
            Some(end) if instant > end => None,
            _ => Some(instant),
        }
    }

    /// Number of series points in the half-open range `(from, to]`.
    fn fires_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
        if to <= from {
            return 0;
        }
        ((to - from).num_milliseconds() / self.interval_ms()) as u32
    }

    fn next_included_after(
        &self,
        window: &FireWindow,
        after: Option<DateTime<Utc>>,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        let mut candidate = self.fire_time_after(window, after);
        if let Some(cal) = calendar {
            while let Some(t) = candidate {
                if cal.is_time_included(t) {
                    break;
                }
                candidate = self.fire_time_after(window, Some(t));
            }
        }
        candidate
    }
}

impl FireSchedule for SimpleSchedule {
    fn compute_first_fire_time(
        &mut self,
        window: &FireWindow,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        let origin = self.series_origin(window);
        let mut candidate = self.bounded(window, origin);
        if let Some(cal) = calendar {
            while let Some(t) = candidate {
                if cal.is_time_included(t) {
                    break;
                }
                candidate = self.fire_time_after(window, Some(t));
            }
        }
        self.next_fire_time = candidate;
        self.previous_fire_time = None;
        candidate
    }

    fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        self.previous_fire_time
    }

    fn fire_time_after(
        &self,
        window: &FireWindow,
        after: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        if let RepeatCount::Finite(n) = self.repeat_count {
            if self.times_triggered > n {
                return None;
            }
        }
        let after = after.unwrap_or_else(Utc::now);
        let origin = self.series_origin(window);

        if self.repeat_count == RepeatCount::Finite(0) {
            if after >= origin {
                return None;
            }
            return self.bounded(window, origin);
        }
        if after < origin {
            return self.bounded(window, origin);
        }
        if let Some(end) = window.end {
            if after > end {
                return None;
            }
        }

        let executed = (after - origin).num_milliseconds() / self.interval_ms() + 1;
        if let RepeatCount::Finite(n) = self.repeat_count {
            if executed > i64::from(n) {
                return None;
            }
        }
        let time = origin + chrono::Duration::milliseconds(executed * self.interval_ms());
        self.bounded(window, time)
    }

    fn final_fire_time(&self, window: &FireWindow) -> Option<DateTime<Utc>> {
        let origin = self.series_origin(window);
        match (self.repeat_count, window.end) {
            (RepeatCount::Finite(n), end) => {
                let last = origin + chrono::Duration::milliseconds(i64::from(n) * self.interval_ms());
                match end {
                    Some(end) if last > end => {
                        if end < origin {
                            return None;
                        }
                        let fits = self.fires_between(origin, end);
                        Some(origin + chrono::Duration::milliseconds(i64::from(fits) * self.interval_ms()))
                    }
                    _ => Some(last),
                }
            }
            (RepeatCount::Indefinite, Some(end)) => {
                if end < origin {
                    return None;
                }
                let fits = self.fires_between(origin, end);
                Some(origin + chrono::Duration::milliseconds(i64::from(fits) * self.interval_ms()))
            }
            (RepeatCount::Indefinite, None) => None,
        }
    }

    fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }

    fn validate_misfire_instruction(&self, instruction: i32) -> bool {
        (MISFIRE_INSTRUCTION_SMART_POLICY..=MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_EXISTING_COUNT)
            .contains(&instruction)
    }

    fn triggered(&mut self, window: &FireWindow, calendar: Option<&dyn Calendar>) {
        self.times_triggered += 1;
        self.previous_fire_time = self.next_fire_time;
        self.next_fire_time = self.next_included_after(window, self.next_fire_time, calendar);
    }

    fn update_after_misfire(
        &mut self,
        window: &FireWindow,
        calendar: Option<&dyn Calendar>,
        instruction: i32,
    ) {
        let mut instruction = instruction;
        if instruction == MISFIRE_INSTRUCTION_SMART_POLICY {
            instruction = match self.repeat_count {
                RepeatCount::Finite(0) => MISFIRE_INSTRUCTION_FIRE_NOW,
                RepeatCount::Indefinite => MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_REMAINING_COUNT,
                RepeatCount::Finite(_) => {
                    MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_EXISTING_REPEAT_COUNT
                }
            };
        } else if instruction == MISFIRE_INSTRUCTION_FIRE_NOW
            && self.repeat_count != RepeatCount::Finite(0)
        {
            instruction = MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_REMAINING_REPEAT_COUNT;
        }

        let now = Utc::now();
        match instruction {
            MISFIRE_INSTRUCTION_FIRE_NOW => {
                self.anchor = Some(now);
                self.next_fire_time = Some(now);
            }
            MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_REMAINING_COUNT => {
                let new_next = self.next_included_after(window, Some(now), calendar);
                if let (Some(missed_until), Some(prev_next)) = (new_next, self.next_fire_time) {
                    self.times_triggered += self.fires_between(prev_next, missed_until);
                }
                self.next_fire_time = new_next;
            }
            MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_EXISTING_COUNT => {
                self.next_fire_time = self.next_included_after(window, Some(now), calendar);
            }
            MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_EXISTING_REPEAT_COUNT => {
                if let RepeatCount::Finite(n) = self.repeat_count {
                    if n != 0 {
                        self.repeat_count =
                            RepeatCount::Finite(n.saturating_sub(self.times_triggered));
                        self.times_triggered = 0;
                    }
                }
                match window.end {
                    Some(end) if end < now => self.next_fire_time = None,
                    _ => {
                        self.anchor = Some(now);
                        self.next_fire_time = Some(now);
                    }
                }
            }
            MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_REMAINING_REPEAT_COUNT => {
                if let RepeatCount::Finite(n) = self.repeat_count {
                    if n != 0 {
                        let missed = self
                            .next_fire_time
                            .map(|next| self.fires_between(next, now))
                            .unwrap_or(0);
                        self.repeat_count = RepeatCount::Finite(
                            n.saturating_sub(self.times_triggered + missed),
                        );
                        self.times_triggered = 0;
                    }
                }
                match window.end {
                    Some(end) if end < now => self.next_fire_time = None,
                    _ => {
                        self.anchor = Some(now);
                        self.next_fire_time = Some(now);
                    }
                }
            }
            _ => {}
        }
    }

    fn update_with_new_calendar(
        &mut self,
        window: &FireWindow,
        calendar: &dyn Calendar,
        misfire_threshold: Duration,
    ) {
        let mut next = self.next_fire_time;
        while let Some(t) = next {
            if calendar.is_time_included(t) {
                break;
            }
            next = self.fire_time_after(window, Some(t));
        }
        if let Some(t) = next {
            let now = Utc::now();
            if t < now {
                let overdue = (now - t).to_std().unwrap_or_default();
                if overdue >= misfire_threshold {
                    next = self.next_included_after(window, Some(now), Some(calendar));
                }
            }
        }
        self.next_fire_time = next;
    }

    fn has_millisecond_precision(&self) -> bool {
        true
    }
}

/// Serde helper storing the interval as integer milliseconds.
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

//! Cron-expression schedule: fire at the instants a cron expression
//! selects, evaluated in a configurable timezone.
//!
//! Accepts standard 5-field expressions (normalized by prepending a
//! seconds field), extended 6- or 7-field expressions, and `@hourly`-style
//! shortcuts.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronExpression;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::core::calendar::Calendar;
use crate::core::trigger::{
    FireSchedule, FireWindow, TriggerError, MISFIRE_INSTRUCTION_SMART_POLICY,
};

/// Misfire handling: fire once immediately, then return to the
/// expression's own cadence.
pub const MISFIRE_INSTRUCTION_FIRE_ONCE_NOW: i32 = 1;

/// Misfire handling: skip the missed fires entirely and wait for the
/// next eligible instant.
pub const MISFIRE_INSTRUCTION_DO_NOTHING: i32 = 2;

/// A cron-expression fire-time schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CronScheduleRepr", into = "CronScheduleRepr")]
pub struct CronSchedule {
    expression: String,
    timezone: Tz,
    parsed: Box<CronExpression>,
    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

/// Persisted form: the expression and timezone are re-parsed on load.
#[derive(Serialize, Deserialize)]
struct CronScheduleRepr {
    expression: String,
    timezone: String,
    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

impl CronSchedule {
    /// Create a schedule evaluated in UTC.
    pub fn new(expression: impl Into<String>) -> Result<Self, TriggerError> {
        Self::with_timezone(expression, "UTC")
    }

    /// Create a schedule evaluated in the given timezone.
    pub fn with_timezone(
        expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Result<Self, TriggerError> {
        let expression = expression.into();
        let timezone = timezone.into();

        let tz: Tz = timezone
            .parse()
            .map_err(|_| TriggerError::InvalidTimezone(timezone.clone()))?;

        let normalized = Self::normalize(&expression)?;
        let parsed = CronExpression::from_str(&normalized)
            .map_err(|e| TriggerError::InvalidCronExpression(e.to_string()))?;

        Ok(Self {
            expression,
            timezone: tz,
            parsed: Box::new(parsed),
            next_fire_time: None,
            previous_fire_time: None,
        })
    }

    /// Accept 5-field expressions by prepending a seconds field; pass
    /// 6- and 7-field expressions and `@` shortcuts through unchanged.
    fn normalize(expression: &str) -> Result<String, TriggerError> {
        let trimmed = expression.trim();
        if trimmed.starts_with('@') {
            return Ok(trimmed.to_string());
        }
        match trimmed.split_whitespace().count() {
            5 => Ok(format!("0 {}", trimmed)),
            6 | 7 => Ok(trimmed.to_string()),
            n => Err(TriggerError::InvalidCronExpression(format!(
                "expected 5, 6 or 7 fields, got {}",
                n
            ))),
        }
    }

    /// The original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Name of the timezone the expression is evaluated in.
    pub fn timezone(&self) -> &str {
        self.timezone.name()
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

impl TryFrom<CronScheduleRepr> for CronSchedule {
    type Error = TriggerError;

    fn try_from(repr: CronScheduleRepr) -> Result<Self, Self::Error> {
        let mut schedule = CronSchedule::with_timezone(repr.expression, repr.timezone)?;
        schedule.next_fire_time = repr.next_fire_time;
        schedule.previous_fire_time = repr.previous_fire_time;
        Ok(schedule)
    }
}

impl From<CronSchedule> for CronScheduleRepr {
    fn from(schedule: CronSchedule) -> Self {
        CronScheduleRepr {
            expression: schedule.expression,
            timezone: schedule.timezone.name().to_string(),
            next_fire_time: schedule.next_fire_time,
            previous_fire_time: schedule.previous_fire_time,
        }
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
            && self.timezone == other.timezone
            && self.next_fire_time == other.next_fire_time
            && self.previous_fire_time == other.previous_fire_time
    }
}

impl FireSchedule for CronSchedule {
    fn compute_first_fire_time(
        &mut self,
        window: &FireWindow,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        // one millisecond back so an occurrence exactly at the window
        // start is eligible
        let just_before_start = window.start - chrono::Duration::milliseconds(1);
        let first = self.next_included_after(window, Some(just_before_start), calendar);
        self.next_fire_time = first;
        self.previous_fire_time = None;
        first
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
        let after = after.unwrap_or_else(Utc::now);
        let floor = window.start - chrono::Duration::milliseconds(1);
        let after = after.max(floor);

        let local = after.with_timezone(&self.timezone);
        let next = self.parsed.after(&local).next()?.with_timezone(&Utc);
        match window.end {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }

    fn final_fire_time(&self, _window: &FireWindow) -> Option<DateTime<Utc>> {
        // occurrences cannot be enumerated backwards from the end bound
        None
    }

    fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }

    fn validate_misfire_instruction(&self, instruction: i32) -> bool {
        (MISFIRE_INSTRUCTION_SMART_POLICY..=MISFIRE_INSTRUCTION_DO_NOTHING).contains(&instruction)
    }

    fn triggered(&mut self, window: &FireWindow, calendar: Option<&dyn Calendar>) {
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
            instruction = MISFIRE_INSTRUCTION_FIRE_ONCE_NOW;
        }

        match instruction {
            MISFIRE_INSTRUCTION_DO_NOTHING => {
                self.next_fire_time = self.next_included_after(window, Some(Utc::now()), calendar);
            }
            MISFIRE_INSTRUCTION_FIRE_ONCE_NOW => {
                let now = Utc::now();
                self.next_fire_time = Some(now.with_nanosecond(0).unwrap_or(now));
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
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> FireWindow {
        FireWindow { start, end }
    }

    #[test]
    fn test_five_field_expression_normalized() {
        let schedule = CronSchedule::new("30 2 * * *").unwrap();
        let w = window(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(), None);

        let first = schedule
            .fire_time_after(&w, Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()))
            .unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 5, 1, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_six_field_expression_with_seconds() {
        let schedule = CronSchedule::new("15 * * * * *").unwrap();
        let w = window(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(), None);

        let first = schedule
            .fire_time_after(&w, Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()))
            .unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 15).unwrap());
    }

    #[test]
    fn test_invalid_expression_rejected() {
        assert!(matches!(
            CronSchedule::new("not a cron"),
            Err(TriggerError::InvalidCronExpression(_))
        ));
        assert!(matches!(
            CronSchedule::new("* * * *"),
            Err(TriggerError::InvalidCronExpression(_))
        ));
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        assert!(matches!(
            CronSchedule::with_timezone("0 * * * *", "Mars/Olympus"),
            Err(TriggerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_occurrence_at_window_start_is_eligible() {
        let mut schedule = CronSchedule::new("0 0 8 * * *").unwrap();
        // the window opens exactly on an occurrence
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let w = window(start, None);

        assert_eq!(schedule.compute_first_fire_time(&w, None), Some(start));
    }

    #[test]
    fn test_triggered_advances_to_next_occurrence() {
        let mut schedule = CronSchedule::new("0 0 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let w = window(start, None);
        schedule.compute_first_fire_time(&w, None);

        schedule.triggered(&w, None);
        assert_eq!(schedule.previous_fire_time(), Some(start));
        assert_eq!(
            schedule.next_fire_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_end_time_exhausts_schedule() {
        let mut schedule = CronSchedule::new("0 0 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let w = window(start, Some(end));
        schedule.compute_first_fire_time(&w, None);

        schedule.triggered(&w, None); // fired 8:00, next 9:00 (== end, inclusive)
        assert_eq!(schedule.next_fire_time(), Some(end));

        schedule.triggered(&w, None); // fired 9:00, nothing after the end
        assert!(schedule.next_fire_time().is_none());
        assert!(!schedule.may_fire_again());
    }

    #[test]
    fn test_timezone_aware_evaluation() {
        // 9 AM New York is 13:00 or 14:00 UTC depending on DST; mid
        // January is EST (UTC-5)
        let schedule = CronSchedule::with_timezone("0 0 9 * * *", "America/New_York").unwrap();
        assert_eq!(schedule.timezone(), "America/New_York");

        let w = window(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(), None);
        let first = schedule
            .fire_time_after(&w, Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()))
            .unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_calendar_masks_occurrences() {
        struct ExcludeNineOClock;
        impl Calendar for ExcludeNineOClock {
            fn is_time_included(&self, instant: DateTime<Utc>) -> bool {
                instant != Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
            }
        }

        let mut schedule = CronSchedule::new("0 0 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let w = window(start, None);
        schedule.compute_first_fire_time(&w, Some(&ExcludeNineOClock));

        schedule.triggered(&w, Some(&ExcludeNineOClock));
        assert_eq!(
            schedule.next_fire_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_misfire_registry() {
        let schedule = CronSchedule::new("0 * * * *").unwrap();
        assert!(schedule.validate_misfire_instruction(MISFIRE_INSTRUCTION_SMART_POLICY));
        assert!(schedule.validate_misfire_instruction(MISFIRE_INSTRUCTION_FIRE_ONCE_NOW));
        assert!(schedule.validate_misfire_instruction(MISFIRE_INSTRUCTION_DO_NOTHING));
        assert!(!schedule.validate_misfire_instruction(3));
    }

    #[test]
    fn test_smart_policy_fires_once_now() {
        let mut schedule = CronSchedule::new("0 0 * * * *").unwrap();
        let start = Utc::now() - chrono::Duration::hours(2);
        let w = window(start, None);
        schedule.compute_first_fire_time(&w, None);

        schedule.update_after_misfire(&w, None, MISFIRE_INSTRUCTION_SMART_POLICY);
        let next = schedule.next_fire_time().unwrap();
        assert!(next >= Utc::now() - chrono::Duration::seconds(2));
        assert_eq!(next.nanosecond(), 0);
    }

    #[test]
    fn test_do_nothing_waits_for_next_occurrence() {
        let mut schedule = CronSchedule::new("0 0 * * * *").unwrap();
        let start = Utc::now() - chrono::Duration::hours(2);
        let w = window(start, None);
        schedule.compute_first_fire_time(&w, None);

        schedule.update_after_misfire(&w, None, MISFIRE_INSTRUCTION_DO_NOTHING);
        let next = schedule.next_fire_time().unwrap();
        assert!(next > Utc::now());
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_no_millisecond_precision() {
        let schedule = CronSchedule::new("0 * * * *").unwrap();
        assert!(!schedule.has_millisecond_precision());
    }

    #[test]
    fn test_final_fire_time_not_computable() {
        let schedule = CronSchedule::new("0 * * * *").unwrap();
        let w = window(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()),
        );
        assert!(schedule.final_fire_time(&w).is_none());
    }

    #[test]
    fn test_serde_round_trip_reparses_expression() {
        let mut schedule = CronSchedule::with_timezone("0 30 6 * * *", "Europe/Berlin").unwrap();
        let w = window(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(), None);
        schedule.compute_first_fire_time(&w, None);

        let json = serde_json::to_string(&schedule).unwrap();
        let restored: CronSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, schedule);

        // the restored schedule still computes fire times
        let next = restored.fire_time_after(&w, schedule.next_fire_time());
        assert!(next.is_some());
    }
}

//! Trigger base: the shared record every schedule kind carries, its state
//! machine, misfire instruction registry, and the fire-time contract.
//!
//! A trigger is an identity plus a schedule plus execution metadata. The
//! fire-time math itself lives in the concrete schedules under
//! [`crate::triggers`]; this module owns everything common to all of them:
//! eager mutator validation, the listener name list, the due-queue
//! comparator, the pre-scheduling validation gate, and the instruction a
//! finished execution reports back to the scheduler.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use super::calendar::Calendar;
use super::data_map::JobDataMap;
use super::job::JobExecutionError;
use super::key::{JobKey, TriggerKey, DEFAULT_GROUP};
use crate::execution::JobExecutionContext;
use crate::scheduler::SchedulerError;
use crate::triggers::TriggerSchedule;

/// Misfire instruction valid for every trigger: defer to the schedule's
/// own `update_after_misfire` logic.
pub const MISFIRE_INSTRUCTION_SMART_POLICY: i32 = 0;

/// Store encoding of the "unknown/absent" trigger state.
///
/// At the API boundary the absent state is `None`; the numeric sentinel
/// exists only for store compatibility.
pub const STATE_NONE_CODE: i32 = -1;

/// Errors raised by trigger mutators (invalid arguments, rejected
/// eagerly before the trigger ever reaches the scheduler).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    /// Trigger name was empty.
    #[error("trigger name cannot be empty")]
    EmptyName,

    /// Job name was empty.
    #[error("job name cannot be empty")]
    EmptyJobName,

    /// Trigger group was present but empty after trimming.
    #[error("trigger group cannot be empty")]
    EmptyGroup,

    /// Job group was present but empty after trimming.
    #[error("job group cannot be empty")]
    EmptyJobGroup,

    /// End time earlier than the start time.
    #[error("end time cannot be before start time")]
    EndBeforeStart,

    /// Start time later than the end time.
    #[error("start time cannot be after end time")]
    StartAfterEnd,

    /// Misfire instruction not in the schedule's registry.
    #[error("misfire instruction {0} is not supported by this schedule")]
    UnsupportedMisfireInstruction(i32),

    /// Repeat interval was zero or out of range.
    #[error("repeat interval must be positive")]
    NonPositiveInterval,

    /// Cron expression failed to parse.
    #[error("invalid cron expression: {0}")]
    InvalidCronExpression(String),

    /// Timezone name was not recognized.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Lifecycle state of a trigger, as tracked by the job store.
///
/// The core does not hold state on the trigger object; it only names the
/// states and their store encodings. The absent/unknown sentinel
/// ([`STATE_NONE_CODE`]) is surfaced as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerState {
    /// Eligible to fire when due.
    Normal,
    /// Administratively paused; resumes to normal.
    Paused,
    /// Schedule exhausted or completion instructed; never fires again.
    Complete,
    /// The scheduler could not instantiate or fire the job; never retried
    /// automatically.
    Error,
    /// The trigger's stateful job is currently executing; held back until
    /// the execution finishes.
    Blocked,
}

impl TriggerState {
    /// Store encoding of this state.
    pub fn code(&self) -> i32 {
        match self {
            TriggerState::Normal => 0,
            TriggerState::Paused => 1,
            TriggerState::Complete => 2,
            TriggerState::Error => 3,
            TriggerState::Blocked => 4,
        }
    }

    /// Decode a store encoding. [`STATE_NONE_CODE`] and unrecognized
    /// codes decode to `None`.
    pub fn from_code(code: i32) -> Option<TriggerState> {
        match code {
            0 => Some(TriggerState::Normal),
            1 => Some(TriggerState::Paused),
            2 => Some(TriggerState::Complete),
            3 => Some(TriggerState::Error),
            4 => Some(TriggerState::Blocked),
            _ => None,
        }
    }
}

/// Instruction a trigger hands back to the scheduler once an execution
/// finished. The integer tags are part of the contract between schedule
/// implementations and the run shell and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletedExecutionInstruction {
    /// Proceed normally.
    Noop,
    /// Re-run the job immediately on the same worker, preserving context.
    ReExecuteJob,
    /// Mark this trigger complete.
    SetTriggerComplete,
    /// Remove this trigger.
    DeleteTrigger,
    /// Mark every trigger of the job complete.
    SetAllJobTriggersComplete,
    /// Mark this trigger errored.
    SetTriggerError,
    /// Mark every trigger of the job errored.
    SetAllJobTriggersError,
}

impl CompletedExecutionInstruction {
    /// Stable integer tag.
    pub fn code(&self) -> i32 {
        match self {
            CompletedExecutionInstruction::Noop => 0,
            CompletedExecutionInstruction::ReExecuteJob => 1,
            CompletedExecutionInstruction::SetTriggerComplete => 2,
            CompletedExecutionInstruction::DeleteTrigger => 3,
            CompletedExecutionInstruction::SetAllJobTriggersComplete => 4,
            CompletedExecutionInstruction::SetTriggerError => 5,
            CompletedExecutionInstruction::SetAllJobTriggersError => 6,
        }
    }

    /// Decode a stable integer tag.
    pub fn from_code(code: i32) -> Option<CompletedExecutionInstruction> {
        match code {
            0 => Some(CompletedExecutionInstruction::Noop),
            1 => Some(CompletedExecutionInstruction::ReExecuteJob),
            2 => Some(CompletedExecutionInstruction::SetTriggerComplete),
            3 => Some(CompletedExecutionInstruction::DeleteTrigger),
            4 => Some(CompletedExecutionInstruction::SetAllJobTriggersComplete),
            5 => Some(CompletedExecutionInstruction::SetTriggerError),
            6 => Some(CompletedExecutionInstruction::SetAllJobTriggersError),
            _ => None,
        }
    }
}

/// The `[start, end]` bounds within which a schedule may produce fire
/// times. `end` is inclusive and optional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FireWindow {
    /// Earliest instant at which firing may occur.
    pub start: DateTime<Utc>,
    /// Optional inclusive upper bound; always `>= start`.
    pub end: Option<DateTime<Utc>>,
}

impl FireWindow {
    /// Whether `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && self.end.map_or(true, |end| instant <= end)
    }
}

/// The fire-time contract every concrete schedule honors.
///
/// The schedule owns its next/previous fire time snapshots and its own
/// misfire-instruction registry; the trigger supplies the window and the
/// optional calendar mask on every call.
pub trait FireSchedule {
    /// Compute and remember the first fire time within the window, or
    /// `None` if the schedule can never fire.
    fn compute_first_fire_time(
        &mut self,
        window: &FireWindow,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>>;

    /// The next instant this schedule will fire, if any.
    fn next_fire_time(&self) -> Option<DateTime<Utc>>;

    /// The most recent instant this schedule fired, if any.
    fn previous_fire_time(&self) -> Option<DateTime<Utc>>;

    /// The first fire time strictly after `after` (`None` means "after
    /// now"), ignoring the schedule's current position.
    fn fire_time_after(
        &self,
        window: &FireWindow,
        after: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>>;

    /// The last instant this schedule can ever fire; `None` when the
    /// schedule is unbounded or the bound cannot be computed.
    fn final_fire_time(&self, window: &FireWindow) -> Option<DateTime<Utc>>;

    /// Whether any fire times remain.
    fn may_fire_again(&self) -> bool;

    /// Whether `instruction` is in this schedule's misfire registry.
    fn validate_misfire_instruction(&self, instruction: i32) -> bool;

    /// Advance past the current fire: the scheduler is committed to
    /// executing the job at the current next fire time.
    fn triggered(&mut self, window: &FireWindow, calendar: Option<&dyn Calendar>);

    /// Repair state to a sane next fire after one or more fire moments
    /// elapsed undelivered, honoring `instruction` (resolved from smart
    /// policy by the schedule itself).
    fn update_after_misfire(
        &mut self,
        window: &FireWindow,
        calendar: Option<&dyn Calendar>,
        instruction: i32,
    );

    /// Re-evaluate the next fire time against a replacement calendar.
    /// A next fire pushed more than `misfire_threshold` into the past is
    /// advanced as a misfire would be.
    fn update_with_new_calendar(
        &mut self,
        window: &FireWindow,
        calendar: &dyn Calendar,
        misfire_threshold: std::time::Duration,
    );

    /// Whether the schedule distinguishes sub-second instants. Schedules
    /// without millisecond precision have trigger start times truncated
    /// to whole seconds.
    fn has_millisecond_precision(&self) -> bool;
}

/// A trigger: identity, schedule, and execution metadata.
///
/// Mutators validate eagerly; a value that constructs successfully also
/// passes the pre-scheduling [`validate`](Trigger::validate) gate unless
/// later mutation broke it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    name: String,
    group: String,
    job_name: String,
    job_group: String,
    description: Option<String>,
    job_data: Option<JobDataMap>,
    volatile: bool,
    calendar_name: Option<String>,
    fire_instance_id: Option<String>,
    misfire_instruction: i32,
    listener_names: Vec<String>,
    window: FireWindow,
    schedule: TriggerSchedule,
}

impl Trigger {
    /// Create a trigger in the default groups, starting now.
    pub fn new(
        name: impl Into<String>,
        job_name: impl Into<String>,
        schedule: TriggerSchedule,
    ) -> Result<Self, TriggerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TriggerError::EmptyName);
        }
        let job_name = job_name.into();
        if job_name.trim().is_empty() {
            return Err(TriggerError::EmptyJobName);
        }
        let start = Self::truncate_for(&schedule, Utc::now());
        Ok(Self {
            name,
            group: DEFAULT_GROUP.to_string(),
            job_name,
            job_group: DEFAULT_GROUP.to_string(),
            description: None,
            job_data: None,
            volatile: false,
            calendar_name: None,
            fire_instance_id: None,
            misfire_instruction: MISFIRE_INSTRUCTION_SMART_POLICY,
            listener_names: Vec::new(),
            window: FireWindow { start, end: None },
            schedule,
        })
    }

    fn truncate_for(schedule: &TriggerSchedule, instant: DateTime<Utc>) -> DateTime<Utc> {
        if schedule.has_millisecond_precision() {
            instant
        } else {
            instant.with_nanosecond(0).unwrap_or(instant)
        }
    }

    // --- identity ----------------------------------------------------

    /// The trigger's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the trigger. Empty names are rejected.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), TriggerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TriggerError::EmptyName);
        }
        self.name = name;
        Ok(())
    }

    /// The trigger's group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Set the group. `None` substitutes the default sentinel; an empty
    /// or whitespace-only group is rejected.
    pub fn set_group(&mut self, group: Option<String>) -> Result<(), TriggerError> {
        match group {
            None => self.group = DEFAULT_GROUP.to_string(),
            Some(g) if g.trim().is_empty() => return Err(TriggerError::EmptyGroup),
            Some(g) => self.group = g,
        }
        Ok(())
    }

    /// Name of the job this trigger fires.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Point the trigger at a different job name. Empty names are
    /// rejected.
    pub fn set_job_name(&mut self, job_name: impl Into<String>) -> Result<(), TriggerError> {
        let job_name = job_name.into();
        if job_name.trim().is_empty() {
            return Err(TriggerError::EmptyJobName);
        }
        self.job_name = job_name;
        Ok(())
    }

    /// Group of the job this trigger fires.
    pub fn job_group(&self) -> &str {
        &self.job_group
    }

    /// Set the job group. Same rules as [`set_group`](Trigger::set_group).
    pub fn set_job_group(&mut self, job_group: Option<String>) -> Result<(), TriggerError> {
        match job_group {
            None => self.job_group = DEFAULT_GROUP.to_string(),
            Some(g) if g.trim().is_empty() => return Err(TriggerError::EmptyJobGroup),
            Some(g) => self.job_group = g,
        }
        Ok(())
    }

    /// The trigger's identity key.
    pub fn key(&self) -> TriggerKey {
        TriggerKey::new(self.name.clone(), self.group.clone())
    }

    /// Identity key of the job this trigger fires.
    pub fn job_key(&self) -> JobKey {
        JobKey::new(self.job_name.clone(), self.job_group.clone())
    }

    /// The fully qualified form, `"group.name"`. This is the identity the
    /// job store addresses the trigger by, and the value the hash derives
    /// from.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.group, self.name)
    }

    // --- metadata ----------------------------------------------------

    /// Human-readable description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the description.
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// The trigger's own data map, constructed on first access.
    pub fn job_data(&mut self) -> &mut JobDataMap {
        self.job_data.get_or_insert_with(JobDataMap::new)
    }

    /// The trigger's data map without forcing construction.
    pub fn job_data_ref(&self) -> Option<&JobDataMap> {
        self.job_data.as_ref()
    }

    /// Whether the trigger is dropped on process restart.
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// Set the volatility flag.
    pub fn set_volatile(&mut self, volatile: bool) {
        self.volatile = volatile;
    }

    /// Name of the calendar masking this trigger's fire times, if any.
    pub fn calendar_name(&self) -> Option<&str> {
        self.calendar_name.as_deref()
    }

    /// Set the calendar name.
    pub fn set_calendar_name(&mut self, calendar_name: Option<String>) {
        self.calendar_name = calendar_name;
    }

    /// Unique per-fire identifier assigned by the job store; opaque to
    /// the core.
    pub fn fire_instance_id(&self) -> Option<&str> {
        self.fire_instance_id.as_deref()
    }

    /// Set the fire instance id. Called by the job store when the trigger
    /// is fired.
    pub fn set_fire_instance_id(&mut self, id: Option<String>) {
        self.fire_instance_id = id;
    }

    // --- misfire -----------------------------------------------------

    /// The configured misfire instruction.
    pub fn misfire_instruction(&self) -> i32 {
        self.misfire_instruction
    }

    /// Set the misfire instruction. Smart policy is always accepted;
    /// anything else must be in the schedule's registry.
    pub fn set_misfire_instruction(&mut self, instruction: i32) -> Result<(), TriggerError> {
        if instruction != MISFIRE_INSTRUCTION_SMART_POLICY
            && !self.schedule.validate_misfire_instruction(instruction)
        {
            return Err(TriggerError::UnsupportedMisfireInstruction(instruction));
        }
        self.misfire_instruction = instruction;
        Ok(())
    }

    // --- listeners ---------------------------------------------------

    /// Names of trigger listeners to notify, in insertion order.
    pub fn trigger_listener_names(&self) -> &[String] {
        &self.listener_names
    }

    /// Append a trigger listener name.
    pub fn add_trigger_listener(&mut self, name: impl Into<String>) {
        self.listener_names.push(name.into());
    }

    /// Remove the first occurrence of a listener name. Returns whether it
    /// was present.
    pub fn remove_trigger_listener(&mut self, name: &str) -> bool {
        match self.listener_names.iter().position(|n| n == name) {
            Some(idx) => {
                self.listener_names.remove(idx);
                true
            }
            None => false,
        }
    }

    // --- window ------------------------------------------------------

    /// Earliest instant at which firing may occur.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.window.start
    }

    /// Set the start time. Rejected if it falls after the end time.
    /// Schedules without millisecond precision have the instant truncated
    /// to a whole second first.
    pub fn set_start_time(&mut self, start: DateTime<Utc>) -> Result<(), TriggerError> {
        let start = Self::truncate_for(&self.schedule, start);
        if let Some(end) = self.window.end {
            if start > end {
                return Err(TriggerError::StartAfterEnd);
            }
        }
        self.window.start = start;
        Ok(())
    }

    /// Optional inclusive upper bound on fire times.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.window.end
    }

    /// Set or clear the end time. Rejected if it precedes the start time.
    pub fn set_end_time(&mut self, end: Option<DateTime<Utc>>) -> Result<(), TriggerError> {
        if let Some(end) = end {
            if end < self.window.start {
                return Err(TriggerError::EndBeforeStart);
            }
        }
        self.window.end = end;
        Ok(())
    }

    /// The schedule's fire window.
    pub fn fire_window(&self) -> &FireWindow {
        &self.window
    }

    // --- schedule dispatch -------------------------------------------

    /// The concrete schedule.
    pub fn schedule(&self) -> &TriggerSchedule {
        &self.schedule
    }

    /// Compute and remember the first fire time.
    pub fn compute_first_fire_time(
        &mut self,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        self.schedule.compute_first_fire_time(&self.window, calendar)
    }

    /// The next instant this trigger will fire, if any.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_fire_time()
    }

    /// The most recent instant this trigger fired, if any.
    pub fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        self.schedule.previous_fire_time()
    }

    /// The first fire time strictly after `after` (`None`: after now).
    pub fn fire_time_after(&self, after: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        self.schedule.fire_time_after(&self.window, after)
    }

    /// The last instant this trigger can ever fire, when computable.
    pub fn final_fire_time(&self) -> Option<DateTime<Utc>> {
        self.schedule.final_fire_time(&self.window)
    }

    /// Whether any fire times remain.
    pub fn may_fire_again(&self) -> bool {
        self.schedule.may_fire_again()
    }

    /// Advance past the current fire. Called by the scheduler when it
    /// commits to executing the job.
    pub fn triggered(&mut self, calendar: Option<&dyn Calendar>) {
        self.schedule.triggered(&self.window, calendar);
    }

    /// Repair schedule state after one or more fire moments elapsed
    /// undelivered, per the configured misfire instruction.
    pub fn update_after_misfire(&mut self, calendar: Option<&dyn Calendar>) {
        let instruction = self.misfire_instruction;
        self.schedule
            .update_after_misfire(&self.window, calendar, instruction);
    }

    /// Re-evaluate the next fire time against a replacement calendar.
    pub fn update_with_new_calendar(
        &mut self,
        calendar: &dyn Calendar,
        misfire_threshold: std::time::Duration,
    ) {
        self.schedule
            .update_with_new_calendar(&self.window, calendar, misfire_threshold);
    }

    /// Classify a finished execution into the instruction the scheduler
    /// acts on: the job error's dispositions first, then schedule
    /// exhaustion, else proceed normally.
    pub fn execution_complete(
        &self,
        _ctx: &JobExecutionContext,
        result: Option<&JobExecutionError>,
    ) -> CompletedExecutionInstruction {
        if let Some(err) = result {
            if err.refire_immediately() {
                return CompletedExecutionInstruction::ReExecuteJob;
            }
            if err.unschedule_firing_trigger() {
                return CompletedExecutionInstruction::SetTriggerComplete;
            }
            if err.unschedule_all_triggers() {
                return CompletedExecutionInstruction::SetAllJobTriggersComplete;
            }
        }
        if !self.may_fire_again() {
            return CompletedExecutionInstruction::SetTriggerComplete;
        }
        CompletedExecutionInstruction::Noop
    }

    // --- ordering & validation ---------------------------------------

    /// Total order for due-queue selection: triggers with a next fire
    /// time sort before those without; otherwise ascending by time.
    ///
    /// Deliberately not `Ord`: equality is by identity key, ordering by
    /// fire time, and the two must not be conflated.
    pub fn compare(&self, other: &Trigger) -> Ordering {
        match (self.next_fire_time(), other.next_fire_time()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }

    /// Pre-scheduling gate: the identity must be complete. Failures are
    /// client errors.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::ClientError(
                "trigger name cannot be empty".to_string(),
            ));
        }
        if self.group.trim().is_empty() {
            return Err(SchedulerError::ClientError(
                "trigger group cannot be empty".to_string(),
            ));
        }
        if self.job_name.trim().is_empty() {
            return Err(SchedulerError::ClientError(
                "trigger must reference a job name".to_string(),
            ));
        }
        if self.job_group.trim().is_empty() {
            return Err(SchedulerError::ClientError(
                "trigger must reference a job group".to_string(),
            ));
        }
        Ok(())
    }
}

impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.group == other.group
    }
}

impl Eq for Trigger {}

impl Hash for Trigger {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name().hash(state);
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} (job: {}.{})",
            self.group, self.name, self.job_group, self.job_name
        )
    }
}

/// Builder for [`Trigger`] in the usual fluent style.
pub struct TriggerBuilder {
    name: String,
    group: Option<String>,
    job_name: String,
    job_group: Option<String>,
    description: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    calendar_name: Option<String>,
    volatile: bool,
    misfire_instruction: Option<i32>,
    listener_names: Vec<String>,
    schedule: TriggerSchedule,
}

impl TriggerBuilder {
    /// Start a builder for a trigger firing the given job.
    pub fn new(
        name: impl Into<String>,
        job_name: impl Into<String>,
        schedule: TriggerSchedule,
    ) -> Self {
        Self {
            name: name.into(),
            group: None,
            job_name: job_name.into(),
            job_group: None,
            description: None,
            start: None,
            end: None,
            calendar_name: None,
            volatile: false,
            misfire_instruction: None,
            listener_names: Vec::new(),
            schedule,
        }
    }

    /// Set the trigger group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the job group.
    pub fn job_group(mut self, job_group: impl Into<String>) -> Self {
        self.job_group = Some(job_group.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the start time (defaults to now).
    pub fn start_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the inclusive end time.
    pub fn end_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Name the calendar masking this trigger.
    pub fn modified_by_calendar(mut self, calendar_name: impl Into<String>) -> Self {
        self.calendar_name = Some(calendar_name.into());
        self
    }

    /// Mark the trigger volatile.
    pub fn volatile(mut self, volatile: bool) -> Self {
        self.volatile = volatile;
        self
    }

    /// Set the misfire instruction.
    pub fn misfire_instruction(mut self, instruction: i32) -> Self {
        self.misfire_instruction = Some(instruction);
        self
    }

    /// Append a trigger listener name.
    pub fn listener(mut self, name: impl Into<String>) -> Self {
        self.listener_names.push(name.into());
        self
    }

    /// Build the trigger, validating every argument through the eager
    /// mutators.
    pub fn build(self) -> Result<Trigger, TriggerError> {
        let mut trigger = Trigger::new(self.name, self.job_name, self.schedule)?;
        trigger.set_group(self.group)?;
        trigger.set_job_group(self.job_group)?;
        trigger.set_description(self.description);
        if let Some(start) = self.start {
            trigger.set_start_time(start)?;
        }
        trigger.set_end_time(self.end)?;
        trigger.set_calendar_name(self.calendar_name);
        trigger.set_volatile(self.volatile);
        if let Some(instruction) = self.misfire_instruction {
            trigger.set_misfire_instruction(instruction)?;
        }
        for name in self.listener_names {
            trigger.add_trigger_listener(name);
        }
        Ok(trigger)
    }
}

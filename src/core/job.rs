//! Job model: the unit of work, its domain error, and the persistable
//! job description.
//!
//! Implement [`Job`] to define work a trigger can fire. A [`JobDetail`]
//! describes the job to the scheduler and the job store; the instance
//! itself is created per firing by a job factory.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::data_map::JobDataMap;
use super::key::{JobKey, DEFAULT_GROUP};
use crate::execution::JobExecutionContext;

/// Errors raised when assembling or validating a [`JobDetail`].
#[derive(Debug, Error)]
pub enum JobDetailError {
    /// Job name was empty.
    #[error("job name cannot be empty")]
    EmptyName,

    /// Job group was present but empty after trimming.
    #[error("job group cannot be empty")]
    EmptyGroup,
}

/// The domain error a job raises to report failure.
///
/// Beyond the failure itself, the error carries the dispositions the
/// trigger consults in `execution_complete`: whether to re-run the job
/// immediately, and whether to unschedule the firing trigger or every
/// trigger of the job.
#[derive(Debug, Error)]
#[error("job execution failed: {message}")]
pub struct JobExecutionError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    refire_immediately: bool,
    unschedule_firing_trigger: bool,
    unschedule_all_triggers: bool,
}

impl JobExecutionError {
    /// A plain failure with no special disposition.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            refire_immediately: false,
            unschedule_firing_trigger: false,
            unschedule_all_triggers: false,
        }
    }

    /// Attach the underlying error.
    pub fn with_source(mut self, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Request that the shell re-execute the job immediately on the same
    /// worker, preserving the execution context.
    pub fn with_refire_immediately(mut self) -> Self {
        self.refire_immediately = true;
        self
    }

    /// Request that the trigger which fired this execution be marked
    /// complete.
    pub fn with_unschedule_firing_trigger(mut self) -> Self {
        self.unschedule_firing_trigger = true;
        self
    }

    /// Request that every trigger of this job be marked complete.
    pub fn with_unschedule_all_triggers(mut self) -> Self {
        self.unschedule_all_triggers = true;
        self
    }

    /// Whether the job asked to be re-executed immediately.
    pub fn refire_immediately(&self) -> bool {
        self.refire_immediately
    }

    /// Whether the firing trigger should be unscheduled.
    pub fn unschedule_firing_trigger(&self) -> bool {
        self.unschedule_firing_trigger
    }

    /// Whether all of the job's triggers should be unscheduled.
    pub fn unschedule_all_triggers(&self) -> bool {
        self.unschedule_all_triggers
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The unit of work fired by a trigger.
///
/// Execution is blocking: the shell runs on a worker thread owned by the
/// scheduler's pool, and the job has exclusive use of that thread until it
/// returns.
pub trait Job: Send + Sync {
    /// Execute one firing.
    ///
    /// Returning [`JobExecutionError`] reports a domain failure; the
    /// trigger decides the firing's fate from the error's dispositions.
    /// A panic is treated as an unhandled error: the shell captures it,
    /// reports it to scheduler listeners, and finishes the firing.
    fn execute(&self, ctx: &mut JobExecutionContext) -> Result<(), JobExecutionError>;
}

/// Persistable description of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetail {
    key: JobKey,
    description: Option<String>,
    job_data: JobDataMap,
    durable: bool,
    volatile: bool,
    stateful: bool,
    requests_recovery: bool,
    listener_names: Vec<String>,
}

impl JobDetail {
    /// Create a detail for the given identity. `group` of `None` places
    /// the job in the default group.
    pub fn new(name: impl Into<String>, group: Option<String>) -> Result<Self, JobDetailError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(JobDetailError::EmptyName);
        }
        let group = match group {
            None => DEFAULT_GROUP.to_string(),
            Some(g) if g.trim().is_empty() => return Err(JobDetailError::EmptyGroup),
            Some(g) => g,
        };
        Ok(Self {
            key: JobKey::new(name, group),
            description: None,
            job_data: JobDataMap::new(),
            durable: false,
            volatile: false,
            stateful: false,
            requests_recovery: false,
            listener_names: Vec::new(),
        })
    }

    /// The job's identity.
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// Human-readable description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the description.
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// The job's own data map.
    pub fn job_data(&self) -> &JobDataMap {
        &self.job_data
    }

    /// Mutable access to the job's data map.
    pub fn job_data_mut(&mut self) -> &mut JobDataMap {
        &mut self.job_data
    }

    /// Whether the job survives with no triggers pointing at it.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Whether the job is dropped on process restart.
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// Whether the job's instance state forbids concurrent execution.
    ///
    /// While a stateful job executes, the store holds every trigger
    /// pointing at it in the blocked state.
    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    /// Whether the job should be re-executed if a firing was in flight
    /// when the process died.
    pub fn requests_recovery(&self) -> bool {
        self.requests_recovery
    }

    /// Names of job listeners to notify for this job, in order.
    pub fn listener_names(&self) -> &[String] {
        &self.listener_names
    }

    /// Append a job listener name.
    pub fn add_job_listener(&mut self, name: impl Into<String>) {
        self.listener_names.push(name.into());
    }

    /// Remove the first occurrence of a listener name. Returns whether it
    /// was present.
    pub fn remove_job_listener(&mut self, name: &str) -> bool {
        match self.listener_names.iter().position(|n| n == name) {
            Some(idx) => {
                self.listener_names.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Pre-scheduling gate: the identity must be complete.
    pub fn validate(&self) -> Result<(), JobDetailError> {
        if self.key.name().trim().is_empty() {
            return Err(JobDetailError::EmptyName);
        }
        if self.key.group().trim().is_empty() {
            return Err(JobDetailError::EmptyGroup);
        }
        Ok(())
    }
}

impl fmt::Display for JobDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Builder for [`JobDetail`].
pub struct JobDetailBuilder {
    name: String,
    group: Option<String>,
    description: Option<String>,
    job_data: JobDataMap,
    durable: bool,
    volatile: bool,
    stateful: bool,
    requests_recovery: bool,
    listener_names: Vec<String>,
}

impl JobDetailBuilder {
    /// Start a builder for a job with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
            description: None,
            job_data: JobDataMap::new(),
            durable: false,
            volatile: false,
            stateful: false,
            requests_recovery: false,
            listener_names: Vec::new(),
        }
    }

    /// Set the group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a data map entry.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.job_data.insert(key, value);
        self
    }

    /// Mark the job durable.
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Mark the job volatile.
    pub fn volatile(mut self, volatile: bool) -> Self {
        self.volatile = volatile;
        self
    }

    /// Mark the job stateful (no concurrent execution).
    pub fn stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    /// Mark the job for recovery after an interrupted firing.
    pub fn requests_recovery(mut self, requests_recovery: bool) -> Self {
        self.requests_recovery = requests_recovery;
        self
    }

    /// Append a job listener name.
    pub fn listener(mut self, name: impl Into<String>) -> Self {
        self.listener_names.push(name.into());
        self
    }

    /// Build the detail, validating the identity.
    pub fn build(self) -> Result<JobDetail, JobDetailError> {
        let mut detail = JobDetail::new(self.name, self.group)?;
        detail.description = self.description;
        let mut job_data = self.job_data;
        job_data.clear_dirty_flag();
        detail.job_data = job_data;
        detail.durable = self.durable;
        detail.volatile = self.volatile;
        detail.stateful = self.stateful;
        detail.requests_recovery = self.requests_recovery;
        detail.listener_names = self.listener_names;
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_group() {
        let detail = JobDetail::new("cleanup", None).unwrap();
        assert_eq!(detail.key().group(), DEFAULT_GROUP);
        assert_eq!(detail.key().name(), "cleanup");
    }

    #[test]
    fn test_new_rejects_empty_name() {
        assert!(matches!(
            JobDetail::new("", None),
            Err(JobDetailError::EmptyName)
        ));
        assert!(matches!(
            JobDetail::new("   ", None),
            Err(JobDetailError::EmptyName)
        ));
    }

    #[test]
    fn test_new_rejects_whitespace_group() {
        assert!(matches!(
            JobDetail::new("cleanup", Some("   ".to_string())),
            Err(JobDetailError::EmptyGroup)
        ));
    }

    #[test]
    fn test_builder() {
        let detail = JobDetailBuilder::new("cleanup")
            .group("maintenance")
            .description("nightly cleanup")
            .data("retention_days", 30)
            .stateful(true)
            .requests_recovery(true)
            .listener("audit")
            .build()
            .unwrap();

        assert_eq!(detail.key().full_name(), "maintenance.cleanup");
        assert_eq!(detail.description(), Some("nightly cleanup"));
        assert_eq!(detail.job_data().get::<i64>("retention_days"), Some(30));
        assert!(detail.is_stateful());
        assert!(detail.requests_recovery());
        assert_eq!(detail.listener_names(), ["audit"]);
        assert!(!detail.job_data().is_dirty());
    }

    #[test]
    fn test_remove_job_listener_reports_presence() {
        let mut detail = JobDetail::new("j", None).unwrap();
        detail.add_job_listener("a");
        detail.add_job_listener("b");

        assert!(detail.remove_job_listener("a"));
        assert!(!detail.remove_job_listener("a"));
        assert_eq!(detail.listener_names(), ["b"]);
    }

    #[test]
    fn test_execution_error_dispositions() {
        let err = JobExecutionError::new("backend unavailable").with_refire_immediately();
        assert!(err.refire_immediately());
        assert!(!err.unschedule_firing_trigger());
        assert!(!err.unschedule_all_triggers());

        let err = JobExecutionError::new("done forever").with_unschedule_all_triggers();
        assert!(err.unschedule_all_triggers());
    }

    #[test]
    fn test_execution_error_display_and_source() {
        let io = std::io::Error::other("disk full");
        let err = JobExecutionError::new("flush failed").with_source(Box::new(io));
        assert_eq!(err.to_string(), "job execution failed: flush failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validate_passes_for_built_detail() {
        let detail = JobDetail::new("ok", Some("grp".to_string())).unwrap();
        assert!(detail.validate().is_ok());
    }
}

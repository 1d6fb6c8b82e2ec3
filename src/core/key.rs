//! Identity keys for triggers and jobs.
//!
//! A key is a (name, group) pair. The group partitions the namespace so
//! that unrelated subsystems can schedule work without name collisions;
//! omitting it places the key in the well-known default group.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Group used when no group is specified.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Identity of a trigger: a (name, group) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    group: String,
    name: String,
}

/// Identity of a job: a (name, group) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    group: String,
    name: String,
}

impl TriggerKey {
    /// Create a key with an explicit group.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Create a key in the default group.
    pub fn with_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }

    /// The name component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group component.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The fully qualified form, `"group.name"`.
    ///
    /// This is the form the job store uses to uniquely address a trigger.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.group, self.name)
    }
}

impl JobKey {
    /// Create a key with an explicit group.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Create a key in the default group.
    pub fn with_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }

    /// The name component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group component.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The fully qualified form, `"group.name"`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.group, self.name)
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

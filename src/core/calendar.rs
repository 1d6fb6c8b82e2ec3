//! Calendar collaborator: a predicate on instants used to mask out
//! otherwise-eligible fire times.
//!
//! Calendars live in the job store and are resolved by name
//! (`Trigger::calendar_name`); the core only consumes them during
//! fire-time computation.

use chrono::{DateTime, Utc};

/// A mask over instants. An excluded instant is never a fire time.
pub trait Calendar: Send + Sync {
    /// Whether firing at `instant` is permitted.
    fn is_time_included(&self, instant: DateTime<Utc>) -> bool;

    /// The first permitted instant at or after `instant`.
    ///
    /// The default walks forward one second at a time; implementations
    /// with structure (business hours, holiday lists) should override
    /// with a direct computation.
    fn next_included_time(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = instant;
        while !self.is_time_included(candidate) {
            candidate += chrono::Duration::seconds(1);
        }
        candidate
    }
}

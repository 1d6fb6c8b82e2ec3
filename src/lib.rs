pub mod core;
pub mod execution;
pub mod listeners;
pub mod scheduler;
pub mod testing;
pub mod triggers;

pub use crate::core::calendar::Calendar;
pub use crate::core::data_map::{DataMapError, JobDataMap};
pub use crate::core::job::{Job, JobDetail, JobDetailBuilder, JobDetailError, JobExecutionError};
pub use crate::core::key::{JobKey, TriggerKey, DEFAULT_GROUP};
pub use crate::core::trigger::{
    CompletedExecutionInstruction, FireSchedule, FireWindow, Trigger, TriggerBuilder, TriggerError,
    TriggerState, MISFIRE_INSTRUCTION_SMART_POLICY, STATE_NONE_CODE,
};

pub use crate::triggers::{CronSchedule, RepeatCount, SimpleSchedule, TriggerSchedule};

pub use crate::listeners::{
    JobListener, ListenerError, ListenerManager, SchedulerListener, TriggerListener,
};

pub use crate::execution::{
    ExecutionHooks, FiredTriggerBundle, JobExecutionContext, JobRunShell, JobRunShellFactory,
    NoopHooks, ShutdownHandle,
};

pub use crate::scheduler::{
    JobFactory, JobStore, JobStoreError, SchedulerCore, SchedulerError, SchedulerRuntime,
    SchedulerSignal,
};

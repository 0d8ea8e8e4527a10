//! Domain model (IDs, sources, task specs, schedules, execution records, errors).

pub mod errors;
pub mod execution;
pub mod ids;
pub mod priority;
pub mod schedule;
pub mod source;
pub mod task;

pub use errors::{CrawlError, ScheduleError, SchedulerError, SinkError};
pub use execution::{ExecutionLogEntry, ExecutionStatus, ExecutionUpdate};
pub use ids::{ParseTaskIdError, TaskId};
pub use priority::Priority;
pub use schedule::{ScheduleConfig, SchedulePatch};
pub use source::{ParseSourceError, Source};
pub use task::TaskSpec;

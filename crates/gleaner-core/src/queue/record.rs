//! Task record: caller-supplied fields + lifecycle metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskStatus;
use crate::domain::{Priority, Source, TaskId, TaskSpec};

/// A task held by the queue.
///
/// Design:
/// - This is the "single source of truth" for task state.
/// - Queue structures (pending list / running set) hold TaskId only.
/// - All state transitions happen here, driven by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub source: Source,
    pub category: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub priority: Priority,
    pub status: TaskStatus,

    /// Failed attempts so far. Never exceeds `max_retries`.
    pub retry_count: u32,
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, spec: TaskSpec, default_max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            source: spec.source,
            category: spec.category,
            keywords: spec.keywords,
            priority: spec.priority,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: spec.max_retries.unwrap_or(default_max_retries),
            created_at: now,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// The caller-supplied part of this task.
    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            source: self.source,
            category: self.category.clone(),
            keywords: self.keywords.clone(),
            priority: self.priority,
            max_retries: Some(self.max_retries),
        }
    }

    pub fn keywords(&self) -> &[String] {
        self.keywords.as_deref().unwrap_or(&[])
    }

    /// Mark as running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
    }

    /// Mark as completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Count one failed attempt. Saturates at `max_retries`.
    pub fn record_failure(&mut self, error: String) {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.error = Some(error);
    }

    /// Move from Running back to Pending.
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
    }

    /// Mark as failed permanently.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_task_takes_default_max_retries() {
        let task = Task::new(
            TaskId::from_ulid(Ulid::new()),
            TaskSpec::new(Source::Amazon),
            3,
            now(),
        );

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.max_retries, 3);
        assert_eq!(task.retry_count, 0);
        assert!(task.keywords().is_empty());
    }

    #[test]
    fn retry_count_never_exceeds_max() {
        let spec = TaskSpec::new(Source::Ebay).with_max_retries(0);
        let mut task = Task::new(TaskId::from_ulid(Ulid::new()), spec, 3, now());

        task.record_failure("boom".into());

        assert_eq!(task.retry_count, 0);
        assert_eq!(task.error.as_deref(), Some("boom"));
    }
}

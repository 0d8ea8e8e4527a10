//! Execution log records written by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Source, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Started,
    Completed,
    Failed,
}

/// One attempt of one task, as seen by the execution log.
///
/// A retried task produces one entry per attempt, all sharing `task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub task_id: TaskId,
    pub source: Source,
    pub status: ExecutionStatus,
    pub items_collected: Option<u64>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl ExecutionLogEntry {
    pub fn started(task_id: TaskId, source: Source, started_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            source,
            status: ExecutionStatus::Started,
            items_collected: None,
            error_message: None,
            started_at,
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Apply an update in place.
    pub fn apply(&mut self, update: &ExecutionUpdate) {
        self.status = update.status;
        if update.items_collected.is_some() {
            self.items_collected = update.items_collected;
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message.clone();
        }
        self.completed_at = Some(update.completed_at);
        self.duration_ms = Some(update.duration_ms);
    }
}

/// Fields written when an attempt finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub items_collected: Option<u64>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionUpdate {
    pub fn completed(items_collected: u64, completed_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            items_collected: Some(items_collected),
            error_message: None,
            completed_at,
            duration_ms,
        }
    }

    pub fn failed(
        error_message: impl Into<String>,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            items_collected: None,
            error_message: Some(error_message.into()),
            completed_at,
            duration_ms,
        }
    }
}

//! ExecutionLog implementations.
//!
//! - TracingExecutionLog: 構造化ログとして出すだけ（デフォルト）
//! - InMemoryExecutionLog: メモリに保持して後から読める（テスト・CLI のサマリ用）

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::{ExecutionLogEntry, ExecutionStatus, ExecutionUpdate, SinkError, TaskId};
use crate::ports::ExecutionLog;

/// Emits every record/update as a `tracing` event on the
/// `gleaner::execution` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExecutionLog;

#[async_trait]
impl ExecutionLog for TracingExecutionLog {
    async fn record(&self, entry: ExecutionLogEntry) -> Result<(), SinkError> {
        info!(
            target: "gleaner::execution",
            task_id = %entry.task_id,
            source = %entry.source,
            status = ?entry.status,
            started_at = %entry.started_at,
            "execution started"
        );
        Ok(())
    }

    async fn update(&self, task_id: TaskId, update: ExecutionUpdate) -> Result<(), SinkError> {
        info!(
            target: "gleaner::execution",
            task_id = %task_id,
            status = ?update.status,
            items_collected = ?update.items_collected,
            error_message = ?update.error_message,
            duration_ms = update.duration_ms,
            "execution finished"
        );
        Ok(())
    }
}

/// Keeps entries in memory, one per attempt.
#[derive(Debug, Default)]
pub struct InMemoryExecutionLog {
    entries: Mutex<Vec<ExecutionLogEntry>>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ExecutionLogEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn entries_for(&self, task_id: TaskId) -> Vec<ExecutionLogEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|entry| entry.task_id == task_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExecutionLog for InMemoryExecutionLog {
    async fn record(&self, entry: ExecutionLogEntry) -> Result<(), SinkError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn update(&self, task_id: TaskId, update: ExecutionUpdate) -> Result<(), SinkError> {
        let mut entries = self.entries.lock().await;
        let open = entries
            .iter_mut()
            .rev()
            .find(|entry| entry.task_id == task_id && entry.status == ExecutionStatus::Started)
            .ok_or_else(|| SinkError::Unavailable(format!("no open execution entry for {task_id}")))?;
        open.apply(&update);
        Ok(())
    }
}

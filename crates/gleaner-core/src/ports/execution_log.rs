//! ExecutionLog port - タスク実行記録の書き込み先
//!
//! コアから見ると write-only（読み戻さない）。
//! 書き込み失敗は呼び出し側で warn ログに落とし、タスク処理は継続します。

use async_trait::async_trait;

use crate::domain::{ExecutionLogEntry, ExecutionUpdate, SinkError, TaskId};

#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Append a new `started` entry.
    async fn record(&self, entry: ExecutionLogEntry) -> Result<(), SinkError>;

    /// Finish the most recent entry of `task_id`.
    async fn update(&self, task_id: TaskId, update: ExecutionUpdate) -> Result<(), SinkError>;
}

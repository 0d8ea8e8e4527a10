//! Queue module: task state, retry policy, and the in-memory TaskQueue.

mod memory;
mod record;
pub mod retry;
mod state;

pub use memory::{InMemoryTaskQueue, QueueSettings};
pub use record::Task;
pub use retry::{RetryDecision, RetryPolicy};
pub use state::TaskStatus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskSpec};

/// Counts reported by `TaskQueue::status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub running: usize,
    pub total: usize,
}

/// TaskQueue port (interface).
///
/// Design intent:
/// - The queue owns every state transition (Pending -> Running -> ...).
/// - The scheduler executes side effects and reports the result.
/// - The queue, not the scheduler, decides retry vs terminal failure.
///
/// The in-memory implementation is the only one today; a durable store
/// would sit behind this same trait.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a new pending task and return its id.
    async fn add_task(&self, spec: TaskSpec) -> TaskId;

    /// Admit the highest-priority eligible pending task, or `None` when
    /// `max_concurrent` tasks are already running or nothing is eligible.
    async fn next_task(&self) -> Option<Task>;

    /// Add several tasks, returning ids in input order.
    ///
    /// The default adds them one by one. Implementations that can insert
    /// the whole batch atomically should override it.
    async fn add_tasks(&self, specs: Vec<TaskSpec>) -> Vec<TaskId> {
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            ids.push(self.add_task(spec).await);
        }
        ids
    }

    /// Mark a running task completed and drop it. Returns `false` (no-op)
    /// for unknown or non-running ids.
    async fn complete_task(&self, task_id: TaskId) -> bool;

    /// Record a failed attempt of a running task. Returns the resulting
    /// status (`Pending` on retry, `Failed` when terminal), or `None` for
    /// unknown or non-running ids.
    async fn fail_task(&self, task_id: TaskId, error: String) -> Option<TaskStatus>;

    async fn status(&self) -> QueueStatus;

    /// Snapshot of a queued (pending or running) task.
    async fn get_task(&self, task_id: TaskId) -> Option<Task>;

    /// Resolves when something may have become admissible: a task was
    /// added, a running slot was freed, or a delayed retry came due.
    ///
    /// Single waiter only. The wakeup is one stored permit (the dispatch
    /// loop consumes it); a second caller waiting at the same time would
    /// take the wakeup away from the dispatcher. Use `status` or `get_task`
    /// to observe the queue from elsewhere.
    async fn changed(&self);
}

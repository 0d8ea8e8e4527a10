//! Task state machine for the queue.

use serde::{Deserialize, Serialize};

/// Task status.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Pending (retry, while retry_count < max_retries)
/// - Pending -> Running -> Failed (retries exhausted)
///
/// Completed and Failed tasks are removed from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for an admission slot.
    Pending,

    /// Currently being executed.
    Running,

    /// Successfully completed.
    Completed,

    /// Failed permanently (retries exhausted).
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Is this task eligible for dispatch?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, false, true)]
    #[case(TaskStatus::Running, false, false)]
    #[case(TaskStatus::Completed, true, false)]
    #[case(TaskStatus::Failed, true, false)]
    fn classification(#[case] status: TaskStatus, #[case] terminal: bool, #[case] runnable: bool) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_runnable(), runnable);
    }
}

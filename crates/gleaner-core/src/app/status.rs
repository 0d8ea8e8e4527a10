//! Status - 運用者向けのスナップショット
//!
//! 実行ログと並んで、運用者が結果を観測する唯一の窓口です。

use serde::{Deserialize, Serialize};

use crate::domain::ScheduleConfig;
use crate::queue::QueueStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// `true` between `start()` and `stop()`.
    pub running: bool,
    pub schedules: Vec<ScheduleConfig>,
    pub queue: QueueStatus,
}

//! Errors - エラー型と分類
//!
//! - ScheduleError: 設定エラー（呼び出し元で同期的に拒否、キューには入らない）
//! - SchedulerError: 制御面（manual trigger / schedule update）のエラー
//! - CrawlError: 外部 crawl 実行のエラー（failTask でリトライ判定）
//! - SinkError: ログ・通知の書き込みエラー（best-effort、タスク状態には影響しない）

use std::time::Duration;

use thiserror::Error;

use super::Source;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("schedule interval for {0} must be greater than zero minutes")]
    NonPositiveInterval(Source),

    #[error("schedule for {0} contains a blank category")]
    BlankCategory(Source),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("{0}")]
    Failed(String),

    #[error("crawl timed out after {0:?}")]
    Timeout(Duration),

    #[error("crawl executor panicked: {0}")]
    Panicked(String),
}

impl CrawlError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

//! SchedulerBuilder - settings と各 port を組み合わせて Scheduler を作る
//!
//! crawl executor だけは利用側が必ず渡す。それ以外の port は省略すると
//! settings から作ったデフォルト（in-memory queue、tracing 出力の log / notifier、
//! `[subscribers]` テーブル）になる。settings の検証は build() で 1 回だけ行う。

use std::sync::Arc;

use super::scheduler::{Scheduler, SchedulerOptions, Shared};
use crate::config::{ConfigError, Settings};
use crate::impls::{StaticSubscriberDirectory, TracingExecutionLog, TracingNotifier};
use crate::ports::{Clock, CrawlExecutor, ExecutionLog, Notifier, SubscriberDirectory, SystemClock};
use crate::queue::{InMemoryTaskQueue, TaskQueue};

/// SchedulerBuilder は Scheduler を構築
///
/// # 使用例
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .settings(load_settings(path)?)
///     .executor(Arc::new(MyCrawler::new()))
///     .build()?;
/// scheduler.start().await;
/// ```
///
/// # Fail-fast 設計
/// - executor は必須。無ければ BuildError::MissingExecutor
/// - settings は build() 時に検証。不正なら BuildError::Config
///
/// # デフォルト
/// - queue: `InMemoryTaskQueue`（settings の dispatch / retry セクションから）
/// - execution log: `TracingExecutionLog`
/// - notifier: `TracingNotifier`
/// - subscribers: settings の `[subscribers]` テーブル
/// - clock: `SystemClock`
#[derive(Default)]
pub struct SchedulerBuilder {
    settings: Option<Settings>,
    executor: Option<Arc<dyn CrawlExecutor>>,
    queue: Option<Arc<dyn TaskQueue>>,
    log: Option<Arc<dyn ExecutionLog>>,
    notifier: Option<Arc<dyn Notifier>>,
    directory: Option<Arc<dyn SubscriberDirectory>>,
    clock: Option<Arc<dyn Clock>>,
}

/// BuildError は Scheduler 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no crawl executor configured; call SchedulerBuilder::executor before build")]
    MissingExecutor,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CrawlExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// 差し替え用。指定した場合、settings の dispatch.max_concurrent と
    /// retry セクションは queue 側の設定が優先されます。
    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn execution_log(mut self, log: Arc<dyn ExecutionLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn subscribers(mut self, directory: Arc<dyn SubscriberDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 検証してから Scheduler を生成（停止状態）
    pub fn build(self) -> Result<Scheduler, BuildError> {
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;

        let executor = self.executor.ok_or(BuildError::MissingExecutor)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let queue = self.queue.unwrap_or_else(|| {
            Arc::new(InMemoryTaskQueue::with_clock(
                settings.queue_settings(),
                Arc::clone(&clock),
            ))
        });
        let log = self
            .log
            .unwrap_or_else(|| Arc::new(TracingExecutionLog));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(StaticSubscriberDirectory::from_map(&settings.subscribers)));

        let shared = Shared {
            queue,
            executor,
            log,
            notifier,
            directory,
            clock,
            options: SchedulerOptions {
                poll_interval: settings.poll_interval(),
                execution_timeout: settings.execution_timeout(),
            },
        };
        Ok(Scheduler::new(shared, settings.effective_schedules()))
    }
}

//! gleaner-core
//!
//! Core building blocks for the Gleaner crawl scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, source, priority, task spec, schedule, execution log, errors）
//! - **ports**: 抽象化レイヤー（CrawlExecutor, ExecutionLog, Notifier, SubscriberDirectory, Clock, IdGenerator）
//! - **queue**: TaskQueue trait と in-memory 実装（優先度、admission control、リトライ）
//! - **app**: アプリケーションロジック（builder, scheduler, timer, dispatcher, runner）
//! - **impls**: ports の実装（tracing 出力、インメモリ）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

#[cfg(test)]
mod testing;

pub use app::{BuildError, Scheduler, SchedulerBuilder, SchedulerStatus};
pub use config::{ConfigError, Settings};

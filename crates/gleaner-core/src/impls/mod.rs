//! Impls - ports の参照実装
//!
//! # 含まれる実装
//! - **TracingExecutionLog / InMemoryExecutionLog**: 実行記録
//! - **TracingNotifier**: 通知を tracing に流す
//! - **StaticSubscriberDirectory**: 設定ファイル由来の購読者テーブル
//!
//! 実際の crawl 実装はこのクレートには含めません。

pub mod execution_log;
pub mod notifier;

pub use self::execution_log::{InMemoryExecutionLog, TracingExecutionLog};
pub use self::notifier::{StaticSubscriberDirectory, TracingNotifier};

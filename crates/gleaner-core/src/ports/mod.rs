//! Ports - 抽象化レイヤー
//!
//! Scheduler が依存する外部コラボレータのインターフェースです。
//! 実装の詳細（実際の crawl、ログの保存先、通知チャネル）はここでは隠蔽します。
//!
//! - CrawlExecutor: 1 タスク分のデータ収集
//! - ExecutionLog: 実行記録の書き込み先
//! - SubscriberDirectory / Notifier: 完了通知
//! - Clock / IdGenerator: 時刻と ID（テストで差し替え可能）

pub mod clock;
pub mod crawl;
pub mod execution_log;
pub mod id_generator;
pub mod notifier;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::crawl::{CrawlExecutor, CrawlReport};
pub use self::execution_log::ExecutionLog;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifier::{Notifier, SubscriberDirectory, UserId};

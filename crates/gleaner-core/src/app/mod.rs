//! App - アプリケーション層
//!
//! このモジュールは、ports と queue を組み合わせてスケジューラを実装します。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: Scheduler の構築とワイヤリング
//! - **Scheduler**: 制御面（start / stop / trigger / update / status）
//! - **timer**: source ごとの定期タスク生成
//! - **dispatcher**: キューからの取り出しループ（admission control は queue 側）
//! - **runner**: 1 タスク分の実行（log → crawl → log → complete/fail → notify）

pub mod builder;
mod dispatcher;
mod runner;
pub mod scheduler;
pub mod status;
pub mod timer;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::scheduler::{Scheduler, SchedulerOptions};
pub use self::status::SchedulerStatus;

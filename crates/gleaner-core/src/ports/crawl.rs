//! CrawlExecutor port - 外部データ収集の抽象化
//!
//! 実際のページ取得・抽出ロジックはこのクレートの外側にあります。
//! Scheduler はこの trait だけを知っていて、呼び出し結果を成功/失敗として扱います。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{CrawlError, Source};

/// Result of one successful crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrawlReport {
    pub items_collected: u64,
}

/// Performs the network fetch/extraction for one task.
///
/// Implementations are untrusted: they may fail, hang, or panic. The
/// scheduler converts all three into a task failure.
#[async_trait]
pub trait CrawlExecutor: Send + Sync {
    async fn execute(
        &self,
        source: Source,
        category: Option<&str>,
        keywords: &[String],
    ) -> Result<CrawlReport, CrawlError>;
}

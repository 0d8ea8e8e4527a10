//! Input spec for a crawl task.

use serde::{Deserialize, Serialize};

use super::{Priority, Source};

/// What the caller asks the queue to run.
///
/// `TaskQueue::add_task` turns this into a `Task` with a fresh id, `pending`
/// status and creation timestamp. Fields here are carried over unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub source: Source,

    /// Optional grouping label (e.g. a product category).
    #[serde(default)]
    pub category: Option<String>,

    /// Optional ordered search terms.
    #[serde(default)]
    pub keywords: Option<Vec<String>>,

    #[serde(default)]
    pub priority: Priority,

    /// Per-task retry limit. `None` means the queue default.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl TaskSpec {
    /// Convenience constructor: medium priority, no category, no keywords.
    pub fn new(source: Source) -> Self {
        Self {
            source,
            category: None,
            keywords: None,
            priority: Priority::Medium,
            max_retries: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

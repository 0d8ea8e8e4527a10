//! Notifier / SubscriberDirectory ports - 完了通知
//!
//! 1. SubscriberDirectory で「カテゴリ X を見ているユーザー」を引く
//! 2. Notifier に fire-and-forget で渡す

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::SinkError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Resolves which users watch a category.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn watchers(&self, category: &str) -> Result<Vec<UserId>, SinkError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        users: &[UserId],
        message: &str,
        payload: serde_json::Value,
    ) -> Result<(), SinkError>;
}

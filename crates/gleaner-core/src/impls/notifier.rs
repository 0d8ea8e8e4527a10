//! Notifier / SubscriberDirectory implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use crate::domain::SinkError;
use crate::ports::{Notifier, SubscriberDirectory, UserId};

/// Emits each notification as a `tracing` event on the
/// `gleaner::notify` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        users: &[UserId],
        message: &str,
        payload: serde_json::Value,
    ) -> Result<(), SinkError> {
        info!(
            target: "gleaner::notify",
            users = users.len(),
            %payload,
            "{message}"
        );
        Ok(())
    }
}

/// Category -> watching users, fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticSubscriberDirectory {
    watchers: HashMap<String, Vec<UserId>>,
}

impl StaticSubscriberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `category -> [user]` map (the `[subscribers]` config
    /// table).
    pub fn from_map<'a>(map: impl IntoIterator<Item = (&'a String, &'a Vec<String>)>) -> Self {
        let watchers = map
            .into_iter()
            .map(|(category, users)| {
                (
                    category.clone(),
                    users.iter().map(|u| UserId::new(u.as_str())).collect(),
                )
            })
            .collect();
        Self { watchers }
    }

    pub fn watch(mut self, category: impl Into<String>, user: UserId) -> Self {
        self.watchers.entry(category.into()).or_default().push(user);
        self
    }
}

#[async_trait]
impl SubscriberDirectory for StaticSubscriberDirectory {
    async fn watchers(&self, category: &str) -> Result<Vec<UserId>, SinkError> {
        Ok(self.watchers.get(category).cloned().unwrap_or_default())
    }
}

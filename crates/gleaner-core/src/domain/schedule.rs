//! Per-source recurring schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Source;
use super::errors::ScheduleError;

/// Which categories to crawl for a source, and how often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub source: Source,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Minutes between ticks. Must be greater than zero.
    pub interval_minutes: u32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ScheduleConfig {
    /// Built-in schedule for a source, used when the config file does not
    /// list it.
    pub fn default_for(source: Source) -> Self {
        let (categories, interval_minutes): (&[&str], u32) = match source {
            Source::Amazon => (&["electronics", "home", "toys"], 60),
            Source::Ebay => (&["electronics", "collectibles"], 120),
            Source::Etsy => (&["handmade", "vintage"], 240),
            Source::Walmart => (&["grocery", "electronics"], 90),
        };
        Self {
            source,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            interval_minutes,
            enabled: true,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.interval_minutes == 0 {
            return Err(ScheduleError::NonPositiveInterval(self.source));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(ScheduleError::BlankCategory(self.source));
        }
        Ok(())
    }

    /// Merge a partial update into a copy of this config and validate the
    /// result. `self` is left untouched when validation fails.
    pub fn merged(&self, patch: &SchedulePatch) -> Result<Self, ScheduleError> {
        let mut next = self.clone();
        if let Some(categories) = &patch.categories {
            next.categories = categories.clone();
        }
        if let Some(interval_minutes) = patch.interval_minutes {
            next.interval_minutes = interval_minutes;
        }
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial schedule update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePatch {
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

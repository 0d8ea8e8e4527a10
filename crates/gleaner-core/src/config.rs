//! Configuration: TOML file -> `Settings`.
//!
//! Every section is optional. Sources missing from `[[schedules]]` fall
//! back to `ScheduleConfig::default_for`.
//!
//! ```toml
//! [dispatch]
//! max_concurrent = 3
//! poll_interval_secs = 30
//! execution_timeout_secs = 120
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 0
//! multiplier = 2.0
//!
//! [[schedules]]
//! source = "amazon"
//! categories = ["electronics", "home"]
//! interval_minutes = 60
//! enabled = true
//!
//! [subscribers]
//! electronics = ["user-1", "user-2"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ScheduleConfig, ScheduleError, Source};
use crate::queue::{QueueSettings, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Validation(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dispatch: DispatchSettings,
    pub retry: RetrySettings,
    pub schedules: Vec<ScheduleConfig>,
    /// category -> users watching it
    pub subscribers: BTreeMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dispatch: DispatchSettings::default(),
            retry: RetrySettings::default(),
            schedules: Source::ALL
                .into_iter()
                .map(ScheduleConfig::default_for)
                .collect(),
            subscribers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Admission limit for simultaneously running tasks.
    pub max_concurrent: usize,
    /// Fallback cadence of the dispatch loop.
    pub poll_interval_secs: u64,
    /// Per-attempt limit on the crawl call. Unset means no limit.
    pub execution_timeout_secs: Option<u64>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            poll_interval_secs: 30,
            execution_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    /// 0 keeps the immediate-retry behaviour.
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 0,
            multiplier: 2.0,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_concurrent < 1 {
            return Err(ConfigError::Validation(
                "dispatch.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.dispatch.poll_interval_secs < 1 {
            return Err(ConfigError::Validation(
                "dispatch.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.dispatch.execution_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "dispatch.execution_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        if !(self.retry.multiplier >= 1.0 && self.retry.multiplier.is_finite()) {
            return Err(ConfigError::Validation(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.retry.multiplier
            )));
        }

        let mut seen = HashSet::new();
        for schedule in &self.schedules {
            if !seen.insert(schedule.source) {
                return Err(ConfigError::Validation(format!(
                    "source '{}' is scheduled more than once",
                    schedule.source
                )));
            }
            schedule.validate()?;
        }
        Ok(())
    }

    /// One schedule per source: configured ones first, built-in defaults
    /// for the rest, ordered as `Source::ALL`.
    pub fn effective_schedules(&self) -> Vec<ScheduleConfig> {
        Source::ALL
            .into_iter()
            .map(|source| {
                self.schedules
                    .iter()
                    .find(|s| s.source == source)
                    .cloned()
                    .unwrap_or_else(|| ScheduleConfig::default_for(source))
            })
            .collect()
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_concurrent: self.dispatch.max_concurrent,
            default_max_retries: self.retry.max_retries,
            retry_policy: RetryPolicy::exponential(
                Duration::from_millis(self.retry.base_delay_ms),
                self.retry.multiplier,
            ),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch.poll_interval_secs)
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.dispatch.execution_timeout_secs.map(Duration::from_secs)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse and validate settings from TOML text.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(content)?;
    settings.validate()?;
    Ok(settings)
}

/// Load and validate settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&content)
}

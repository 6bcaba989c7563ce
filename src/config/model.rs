// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::{CancelledDependency, Priority};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// name = "build"
/// max_concurrency = 4
/// default_priority = "user_initiated"
/// cancelled_dependency = "cancel"
/// retention_secs = 300
/// ```
///
/// Every field is optional; see [`SchedulerConfig::default`] for the values
/// used when a field is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: RawSchedulerConfig,
}

/// `[scheduler]` section, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSchedulerConfig {
    /// Name attached to every log record of this scheduler.
    #[serde(default)]
    pub name: Option<String>,

    /// Number of worker slots. Defaults to the available hardware
    /// parallelism.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Priority used by submissions that do not set one.
    #[serde(default)]
    pub default_priority: Priority,

    /// `"cancel"` (default) or `"satisfy"`.
    #[serde(default)]
    pub cancelled_dependency: CancelledDependency,

    /// How long terminal tasks are kept for result retrieval. Unset means
    /// "until `release`".
    #[serde(default)]
    pub retention_secs: Option<u64>,
}

/// Validated scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub name: String,
    /// Always `>= 1`.
    pub max_concurrency: usize,
    pub default_priority: Priority,
    pub cancelled_dependency: CancelledDependency,
    pub retention: Option<Duration>,
}

pub(crate) const DEFAULT_NAME: &str = "dagqueue";

/// Worker count used when none is configured.
pub fn default_max_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            max_concurrency: default_max_concurrency(),
            default_priority: Priority::default(),
            cancelled_dependency: CancelledDependency::default(),
            retention: None,
        }
    }
}

impl SchedulerConfig {
    /// Construct without validation. Only `config::validate` and the `with_*`
    /// setters should call this.
    pub(crate) fn new_unchecked(raw: RawSchedulerConfig) -> Self {
        Self {
            name: raw.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            max_concurrency: raw.max_concurrency.unwrap_or_else(default_max_concurrency),
            default_priority: raw.default_priority,
            cancelled_dependency: raw.cancelled_dependency,
            retention: raw.retention_secs.map(Duration::from_secs),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of worker slots; clamped to at least 1.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_cancelled_dependency(mut self, policy: CancelledDependency) -> Self {
        self.cancelled_dependency = policy;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }
}

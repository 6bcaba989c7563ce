#![allow(dead_code)]

use dagqueue::config::{RawConfigFile, RawSchedulerConfig};
use dagqueue::{CancelledDependency, Priority, SchedulerConfig};

/// Builder for `SchedulerConfig` that goes through the same validation path
/// as a config file.
pub struct SchedulerConfigBuilder {
    config: RawSchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawSchedulerConfig {
                name: Some("test".to_string()),
                max_concurrency: Some(2),
                ..RawSchedulerConfig::default()
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.name = Some(name.to_string());
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = Some(n);
        self
    }

    pub fn default_priority(mut self, priority: Priority) -> Self {
        self.config.default_priority = priority;
        self
    }

    pub fn cancelled_dependency(mut self, policy: CancelledDependency) -> Self {
        self.config.cancelled_dependency = policy;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = Some(secs);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        RawConfigFile {
            scheduler: self.config,
        }
    }

    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a validated config with `n` workers.
pub fn config_with_workers(n: usize) -> SchedulerConfig {
    SchedulerConfigBuilder::new().max_concurrency(n).build()
}

// src/config/validate.rs

use crate::config::model::{RawConfigFile, RawSchedulerConfig, SchedulerConfig};
use crate::errors::{Result, SchedulerError};

impl TryFrom<RawSchedulerConfig> for SchedulerConfig {
    type Error = SchedulerError;

    fn try_from(raw: RawSchedulerConfig) -> std::result::Result<Self, Self::Error> {
        validate_scheduler_section(&raw)?;
        Ok(SchedulerConfig::new_unchecked(raw))
    }
}

impl TryFrom<RawConfigFile> for SchedulerConfig {
    type Error = SchedulerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        SchedulerConfig::try_from(raw.scheduler)
    }
}

fn validate_scheduler_section(cfg: &RawSchedulerConfig) -> Result<()> {
    if cfg.max_concurrency == Some(0) {
        return Err(SchedulerError::ConfigError(
            "[scheduler].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(name) = &cfg.name {
        if name.trim().is_empty() {
            return Err(SchedulerError::ConfigError(
                "[scheduler].name must not be empty".to_string(),
            ));
        }
    }

    if cfg.retention_secs == Some(0) {
        return Err(SchedulerError::ConfigError(
            "[scheduler].retention_secs must be >= 1 when set (got 0)".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::{CancelledDependency, Priority};

    #[test]
    fn empty_section_uses_defaults() {
        let cfg = SchedulerConfig::try_from(RawSchedulerConfig::default()).unwrap();
        assert_eq!(cfg.name, "dagqueue");
        assert!(cfg.max_concurrency >= 1);
        assert_eq!(cfg.default_priority, Priority::Default);
        assert_eq!(cfg.cancelled_dependency, CancelledDependency::Cancel);
        assert_eq!(cfg.retention, None);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let raw = RawSchedulerConfig {
            max_concurrency: Some(0),
            ..Default::default()
        };
        match SchedulerConfig::try_from(raw) {
            Err(SchedulerError::ConfigError(msg)) => assert!(msg.contains("max_concurrency")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn blank_name_is_rejected() {
        let raw = RawSchedulerConfig {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            SchedulerConfig::try_from(raw),
            Err(SchedulerError::ConfigError(_))
        ));
    }

    #[test]
    fn retention_is_converted_to_duration() {
        let raw = RawSchedulerConfig {
            retention_secs: Some(30),
            ..Default::default()
        };
        let cfg = SchedulerConfig::try_from(raw).unwrap();
        assert_eq!(cfg.retention, Some(Duration::from_secs(30)));
    }
}

// src/logging.rs

//! Logging setup for the `dagqueue` binary using `tracing` +
//! `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `DAGQUEUE_LOG` environment variable; accepts a plain level ("debug")
//!    or full `EnvFilter` directives ("dagqueue::engine=trace,info")
//! 3. default to `info`
//!
//! Logs go to STDERR so the run summary on stdout stays clean.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV: &str = "DAGQUEUE_LOG";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directive_for(lvl)),
        None => std::env::var(LOG_ENV)
            .ok()
            .and_then(|s| parse_filter(&s))
            .unwrap_or_else(|| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn parse_filter(s: &str) -> Option<EnvFilter> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let directives = match s.to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        _ => s.to_string(),
    };
    EnvFilter::try_new(directives).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_value_accepts_levels_and_directives() {
        assert!(parse_filter("debug").is_some());
        assert!(parse_filter("Warning").is_some());
        assert!(parse_filter("dagqueue::engine=trace,info").is_some());
        assert!(parse_filter("   ").is_none());
    }

    #[test]
    fn cli_levels_map_to_directives() {
        assert_eq!(directive_for(LogLevel::Trace), "trace");
        assert_eq!(directive_for(LogLevel::Warn), "warn");
    }
}

// src/cli.rs

//! CLI argument parsing for the `dagqueue` demo binary using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `dagqueue`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagqueue",
    version,
    about = "Run a synthetic dependency graph of tasks through the scheduler.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If the file does not exist the built-in defaults are used.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Number of tasks in the generated workload.
    #[arg(long, value_name = "N", default_value_t = 24)]
    pub tasks: usize,

    /// Make every Nth task fail, to show cancellation of its dependents.
    #[arg(long, value_name = "N")]
    pub fail_every: Option<usize>,

    /// Override `max_concurrency` from the config file.
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Seed for the workload generator.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGQUEUE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve and print the configuration and workload, but run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

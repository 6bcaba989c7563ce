// src/lib.rs

//! In-process, dependency-aware concurrent task scheduler.
//!
//! Tasks are async jobs with a [`Priority`] and a set of dependencies on
//! earlier tasks. A [`Scheduler`] runs each task once all its dependencies
//! completed, at most `max_concurrency` at a time, higher priorities first.
//! Failures cancel everything downstream; cancellation of running work is
//! cooperative through a [`CancelToken`].
//!
//! ```no_run
//! use dagqueue::{Priority, Scheduler, SchedulerConfig, TaskOutcome};
//!
//! # async fn demo() -> dagqueue::Result<()> {
//! let scheduler = Scheduler::new(SchedulerConfig::default().with_max_concurrency(2));
//! let fetch = scheduler.spawn(|_token| async { Ok::<u32, anyhow::Error>(2) })?;
//! let double = scheduler.submit(
//!     |_token| async { Ok::<u32, anyhow::Error>(4) },
//!     Priority::Critical,
//!     [fetch.id()],
//! )?;
//!
//! assert!(matches!(double.wait().await?, TaskOutcome::Completed(4)));
//! scheduler.shutdown(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;
pub mod workload;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result as AnyResult;
use tracing::{debug, info, warn};

pub use crate::config::SchedulerConfig;
pub use crate::dag::{SchedulerStats, TaskError, TaskFailure, TaskOutcome, TaskState};
pub use crate::engine::{NewTask, Scheduler, TaskHandle};
pub use crate::errors::{Result, SchedulerError};
pub use crate::exec::{CancelToken, Cancelled, Job, blocking};
pub use crate::types::{CancelledDependency, Priority, TaskId};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::workload::{RunSummary, WorkloadConfig, WorkloadTask};

/// High-level entry point used by `main.rs`.
///
/// Loads the configuration, generates a workload, runs it to completion and
/// prints a summary. Ctrl-C cancels everything still outstanding.
pub async fn run(args: CliArgs) -> AnyResult<()> {
    let mut config = resolve_config(&args.config)?;
    if let Some(max) = args.max_concurrency {
        config = config.with_max_concurrency(max);
    }

    let workload = workload::generate(&WorkloadConfig {
        task_count: args.tasks,
        fail_every: args.fail_every,
        seed: args.seed,
        ..WorkloadConfig::default()
    });

    if args.dry_run {
        print_dry_run(&config, &workload);
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::<usize>::new(config));

    // Ctrl-C → cancel everything outstanding.
    let interrupt = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let hit = scheduler.cancel_all();
            warn!(cancelled = hit, "interrupted; cancelling outstanding tasks");
        })
    };

    let started = Instant::now();
    let handles = workload::submit_all(&scheduler, &workload)?;
    info!(tasks = handles.len(), "workload submitted");

    let summary = workload::wait_all(&handles).await?;

    scheduler.shutdown(true).await?;
    interrupt.abort();

    print_summary(&summary, started.elapsed());
    Ok(())
}

/// Load the config file if it exists, otherwise fall back to defaults.
fn resolve_config(path: &Path) -> AnyResult<SchedulerConfig> {
    if path.exists() {
        info!(path = %path.display(), "loading configuration");
        Ok(load_and_validate(path)?)
    } else {
        debug!(path = %path.display(), "no configuration file; using defaults");
        Ok(SchedulerConfig::default())
    }
}

fn print_dry_run(config: &SchedulerConfig, workload: &[WorkloadTask]) {
    println!("dagqueue dry-run");
    println!("  scheduler.name = {}", config.name);
    println!("  scheduler.max_concurrency = {}", config.max_concurrency);
    println!("  scheduler.default_priority = {:?}", config.default_priority);
    println!("  scheduler.cancelled_dependency = {:?}", config.cancelled_dependency);
    match config.retention {
        Some(retention) => println!("  scheduler.retention = {retention:?}"),
        None => println!("  scheduler.retention = until released"),
    }
    println!();

    println!("tasks ({}):", workload.len());
    for task in workload {
        println!("  - {} ({:?}, {:?})", task.label, task.priority, task.duration);
        if !task.deps.is_empty() {
            let deps: Vec<String> = task.deps.iter().map(|d| format!("task_{d}")).collect();
            println!("      after: {deps:?}");
        }
        if task.fails {
            println!("      fails: true");
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(summary: &RunSummary, elapsed: std::time::Duration) {
    println!("dagqueue finished in {elapsed:.2?}");
    println!("  completed: {}", summary.completed);
    println!("  failed:    {}", summary.failed);
    println!("  cancelled: {}", summary.cancelled);
}

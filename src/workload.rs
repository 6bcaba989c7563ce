// src/workload.rs

//! Synthetic workloads for the demo binary.
//!
//! Generates a random but reproducible DAG: the first `root_tasks` tasks have
//! no dependencies and every later task depends only on earlier ones, so the
//! result is acyclic by construction.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::dag::TaskState;
use crate::engine::{NewTask, Scheduler, TaskHandle};
use crate::errors::Result;
use crate::exec::CancelToken;
use crate::types::{Priority, TaskId};

/// Shape of a generated workload.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub task_count: usize,
    /// Tasks at the front of the list that never get dependencies.
    pub root_tasks: usize,
    pub max_dependencies: usize,
    /// Make every Nth task (1-based) fail.
    pub fail_every: Option<usize>,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            task_count: 24,
            root_tasks: 4,
            max_dependencies: 3,
            fail_every: None,
            min_duration: Duration::from_millis(5),
            max_duration: Duration::from_millis(40),
            seed: 7,
        }
    }
}

/// One generated task. Dependencies are indices of earlier tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadTask {
    pub index: usize,
    pub label: String,
    pub priority: Priority,
    pub deps: Vec<usize>,
    pub duration: Duration,
    pub fails: bool,
}

const PRIORITIES: [Priority; 4] = [
    Priority::Background,
    Priority::Default,
    Priority::UserInitiated,
    Priority::Critical,
];

pub fn generate(config: &WorkloadConfig) -> Vec<WorkloadTask> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut tasks = Vec::with_capacity(config.task_count);

    let min_ms = config.min_duration.as_millis() as u64;
    let max_ms = (config.max_duration.as_millis() as u64).max(min_ms);

    for index in 0..config.task_count {
        let mut deps = BTreeSet::new();
        if index >= config.root_tasks && index > 0 {
            let count = rng.gen_range(0..=config.max_dependencies);
            for _ in 0..count {
                deps.insert(rng.gen_range(0..index));
            }
        }

        let fails = config
            .fail_every
            .is_some_and(|n| n > 0 && (index + 1) % n == 0);

        tasks.push(WorkloadTask {
            index,
            label: format!("task_{index}"),
            priority: PRIORITIES[rng.gen_range(0..PRIORITIES.len())],
            deps: deps.into_iter().collect(),
            duration: Duration::from_millis(rng.gen_range(min_ms..=max_ms)),
            fails,
        });
    }

    tasks
}

/// Submit a generated workload. Each job sleeps for its duration (stopping
/// early if cancelled) and returns its index.
pub fn submit_all(
    scheduler: &Scheduler<usize>,
    tasks: &[WorkloadTask],
) -> Result<Vec<TaskHandle<usize>>> {
    let mut handles: Vec<TaskHandle<usize>> = Vec::with_capacity(tasks.len());

    for task in tasks {
        let deps: Vec<TaskId> = task.deps.iter().map(|&i| handles[i].id()).collect();
        let index = task.index;
        let duration = task.duration;
        let fails = task.fails;

        let spec = NewTask::new(move |token: CancelToken| async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = token.cancelled() => {}
            }
            token.check()?;
            if fails {
                anyhow::bail!("task_{index} failed on purpose");
            }
            Ok::<usize, anyhow::Error>(index)
        })
        .priority(task.priority)
        .depends_on_all(deps)
        .label(task.label.clone());

        let handle = scheduler.submit_task(spec)?;
        debug!(task = %handle.id(), label = %task.label, "workload task submitted");
        handles.push(handle);
    }

    Ok(handles)
}

/// Terminal states counted over the handles of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Cancelled => self.cancelled += 1,
            TaskState::Pending | TaskState::Ready | TaskState::Running => {}
        }
    }
}

/// Wait for every handle in order and count the outcomes.
///
/// Handles carry their own outcome, so tasks swept by a retention window
/// while earlier ones are still being awaited are still counted.
pub async fn wait_all(handles: &[TaskHandle<usize>]) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    for handle in handles {
        let outcome = handle.wait().await?;
        debug!(task = %handle.id(), state = ?outcome.state(), "task finished");
        summary.record(outcome.state());
    }
    Ok(summary)
}

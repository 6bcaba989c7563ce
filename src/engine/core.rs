// src/engine/core.rs

//! Synchronous scheduler core.
//!
//! This owns every table the scheduler has: task records, the dependency
//! graph, the ready queue and the per-state counters. All methods are plain
//! synchronous calls that return a [`SchedulerStep`] describing what changed;
//! the async façade wraps the core in a single mutex and never holds that
//! mutex while a job runs.
//!
//! The core has no Tokio runtime dependency, so the ordering, readiness and
//! cancellation rules can be unit tested (and property tested) without
//! spawning anything.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::dag::{
    DependencyGraph, Dispatch, SchedulerStats, SchedulerStep, StateManager, TaskFailure,
    TaskOutcome, TaskRecord, TaskState,
};
use crate::engine::NewTask;
use crate::engine::queue::ReadyQueue;
use crate::errors::{Result, SchedulerError};
use crate::types::TaskId;

/// Pure core state.
pub struct SchedulerCore<T> {
    config: SchedulerConfig,
    tasks: HashMap<TaskId, TaskRecord<T>>,
    graph: DependencyGraph,
    queue: ReadyQueue,
    stats: SchedulerStats,
    next_id: u64,
    next_seq: u64,
    closed: bool,
}

impl<T> std::fmt::Debug for SchedulerCore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerCore")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("queued", &self.queue.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<T> SchedulerCore<T> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            tasks: HashMap::new(),
            graph: DependencyGraph::new(),
            queue: ReadyQueue::new(),
            stats: SchedulerStats::default(),
            next_id: 1,
            next_seq: 1,
            closed: false,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// `true` once shutdown has begun; submissions are rejected from then on.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn status(&self, id: TaskId) -> Result<TaskState> {
        self.tasks
            .get(&id)
            .map(|record| record.state)
            .ok_or(SchedulerError::NotFound(id))
    }

    /// Direct dependencies still tracked by the graph. Released tasks no
    /// longer show up.
    pub fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        if !self.tasks.contains_key(&id) {
            return Err(SchedulerError::NotFound(id));
        }
        let mut deps = self.graph.dependencies_of(id);
        deps.sort();
        Ok(deps)
    }

    /// Subscribe to the terminal outcome of a task.
    pub fn subscribe(&self, id: TaskId) -> Result<watch::Receiver<Option<TaskOutcome<T>>>> {
        self.tasks
            .get(&id)
            .map(TaskRecord::subscribe)
            .ok_or(SchedulerError::NotFound(id))
    }

    /// Number of tasks currently sitting in the ready queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether workers may exit: closed, nothing queued, nothing waiting on
    /// running dependencies.
    pub fn workers_should_exit(&self) -> bool {
        self.closed && self.queue.is_empty() && self.stats.pending == 0
    }

    fn manager(&mut self) -> StateManager<'_, T> {
        StateManager::new(
            &mut self.tasks,
            &mut self.graph,
            &mut self.queue,
            &mut self.stats,
            self.config.cancelled_dependency,
        )
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert_placeholder(&mut self, id: TaskId) {
        self.tasks.insert(id, TaskRecord::placeholder(id));
        self.graph.add_placeholder(id);
        self.stats.add(TaskState::Pending);
    }

    /// Allocate an id whose work will be submitted later with
    /// [`submit_reserved`](Self::submit_reserved). Other tasks may depend on
    /// it in the meantime.
    pub fn reserve(&mut self) -> Result<TaskId> {
        if self.closed {
            return Err(SchedulerError::SchedulerClosed);
        }
        let id = self.allocate_id();
        self.insert_placeholder(id);
        debug!(scheduler = %self.config.name, task = %id, "reserved task id");
        Ok(id)
    }

    /// Register a new task. On error nothing is registered.
    pub fn submit(&mut self, task: NewTask<T>) -> Result<(TaskId, SchedulerStep)> {
        if self.closed {
            return Err(SchedulerError::SchedulerClosed);
        }
        let id = self.allocate_id();
        let step = self.register(id, task, true)?;
        Ok((id, step))
    }

    /// Attach work to a reserved id.
    pub fn submit_reserved(&mut self, id: TaskId, task: NewTask<T>) -> Result<SchedulerStep> {
        if self.closed {
            return Err(SchedulerError::SchedulerClosed);
        }
        match self.tasks.get(&id) {
            None => return Err(SchedulerError::NotFound(id)),
            Some(record) if !(record.placeholder && record.state == TaskState::Pending) => {
                return Err(SchedulerError::InvalidStateTransition {
                    task: id,
                    from: record.state,
                    to: TaskState::Pending,
                });
            }
            Some(_) => {}
        }
        self.register(id, task, false)
    }

    fn register(&mut self, id: TaskId, task: NewTask<T>, fresh: bool) -> Result<SchedulerStep> {
        let policy = self.config.cancelled_dependency;
        let priority = task.priority.unwrap_or(self.config.default_priority);

        let tasks = &self.tasks;
        let state_of = |dep: TaskId| tasks.get(&dep).map(|record| record.state);
        let outstanding = self.graph.add_task(id, &task.deps, |dep| {
            state_of(dep).is_some_and(|state| StateManager::<T>::satisfies_dependents(policy, state))
        })?;
        let doomed = task.deps.iter().any(|&dep| {
            state_of(dep).is_some_and(|state| StateManager::<T>::dooms_dependents(policy, state))
        });

        if fresh {
            self.tasks.insert(id, TaskRecord::placeholder(id));
            self.stats.add(TaskState::Pending);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let NewTask {
            job, deps, label, ..
        } = task;
        if let Some(record) = self.tasks.get_mut(&id) {
            record.fill(job, priority, seq, deps, label);
            info!(
                scheduler = %self.config.name,
                task = %record.display_name(),
                ?priority,
                deps = ?record.deps,
                outstanding,
                "task submitted"
            );
        }

        let mut step = SchedulerStep::default();
        if doomed {
            debug!(task = %id, "a dependency already failed or was cancelled; cancelling on submit");
            let (_, cancelled) = self.manager().cancel(id)?;
            step.merge(cancelled);
        } else if outstanding == 0 {
            self.manager().mark_ready(id, &mut step)?;
        }

        Ok(step)
    }

    /// Pop the next ready task, mark it `Running` and hand its job out.
    pub fn dispatch_next(&mut self) -> Option<Dispatch<T>> {
        while let Some(id) = self.queue.pop() {
            if let Err(err) = self.manager().transition(id, TaskState::Running) {
                warn!(task = %id, error = %err, "queued task could not start; skipping");
                continue;
            }

            let dispatch = self.tasks.get_mut(&id).and_then(|record| {
                let job = record.job.take()?;
                Some(Dispatch {
                    id,
                    label: record.label.clone(),
                    priority: record.priority,
                    job,
                    cancel: record.cancel.clone(),
                })
            });

            match dispatch {
                Some(dispatch) => {
                    debug!(
                        scheduler = %self.config.name,
                        task = %id,
                        priority = ?dispatch.priority,
                        running = self.stats.running,
                        "dispatching task"
                    );
                    return Some(dispatch);
                }
                None => {
                    warn!(task = %id, "running task has no job attached; failing it");
                    let failure =
                        TaskFailure::Error(std::sync::Arc::new(anyhow::anyhow!("task has no work attached")));
                    if let Err(err) = self.finish(id, TaskOutcome::Failed(failure)) {
                        warn!(task = %id, error = %err, "could not fail task without work");
                    }
                }
            }
        }
        None
    }

    /// Record a worker's report for a `Running` task.
    pub fn finish(&mut self, id: TaskId, outcome: TaskOutcome<T>) -> Result<SchedulerStep> {
        let step = self.manager().finish(id, outcome)?;
        if !step.is_empty() {
            debug!(
                scheduler = %self.config.name,
                task = %id,
                newly_ready = ?step.newly_ready,
                newly_cancelled = ?step.newly_cancelled,
                "applied task outcome"
            );
        }
        Ok(step)
    }

    /// Cancel a task; see [`StateManager::cancel`]. Never fails for a known
    /// task, terminal or not.
    pub fn cancel(&mut self, id: TaskId) -> Result<(TaskState, SchedulerStep)> {
        self.manager().cancel(id)
    }

    /// Cancel every non-terminal task. Running tasks only get their flag set.
    pub fn cancel_all(&mut self) -> SchedulerStep {
        let mut ids: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|record| !record.state.is_terminal())
            .map(|record| record.id)
            .collect();
        ids.sort();

        let mut step = SchedulerStep::default();
        for id in ids {
            match self.manager().cancel(id) {
                Ok((_, cancelled)) => step.merge(cancelled),
                Err(err) => warn!(task = %id, error = %err, "cancel_all: could not cancel task"),
            }
        }
        info!(
            scheduler = %self.config.name,
            cancelled = step.newly_cancelled.len(),
            signalled = step.cancel_requested.len(),
            "cancelled all outstanding tasks"
        );
        step
    }

    /// Evict a terminal task's record. Its id becomes unknown afterwards.
    pub fn release(&mut self, id: TaskId) -> Result<()> {
        let state = self.status(id)?;
        if !state.is_terminal() {
            return Err(SchedulerError::NotTerminal { task: id, state });
        }
        self.evict(id, state);
        debug!(scheduler = %self.config.name, task = %id, "released task");
        Ok(())
    }

    fn evict(&mut self, id: TaskId, state: TaskState) {
        self.tasks.remove(&id);
        self.graph.remove(id);
        self.stats.remove(state);
    }

    /// Evict terminal tasks that finished longer ago than the retention
    /// window. No-op when no window is configured.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<TaskId> {
        let Some(retention) = self.config.retention else {
            return Vec::new();
        };

        let mut expired: Vec<(TaskId, TaskState)> = self
            .tasks
            .values()
            .filter(|record| record.state.is_terminal())
            .filter(|record| {
                record
                    .finished_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= retention)
            })
            .map(|record| (record.id, record.state))
            .collect();
        expired.sort_by_key(|(id, _)| *id);

        for &(id, state) in &expired {
            self.evict(id, state);
        }
        if !expired.is_empty() {
            debug!(scheduler = %self.config.name, evicted = expired.len(), "retention window swept");
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    /// Stop accepting submissions.
    ///
    /// Reserved ids that never got work are cancelled (nothing can fill them
    /// any more). Without `drain_pending`, every `Pending`/`Ready` task is
    /// cancelled as well; `Running` tasks are left to finish.
    pub fn shutdown(&mut self, drain_pending: bool) -> SchedulerStep {
        self.closed = true;

        let mut targets: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|record| match record.state {
                TaskState::Pending => record.placeholder || !drain_pending,
                TaskState::Ready => !drain_pending,
                _ => false,
            })
            .map(|record| record.id)
            .collect();
        targets.sort();

        let mut step = SchedulerStep::default();
        for id in targets {
            match self.manager().cancel(id) {
                Ok((_, cancelled)) => step.merge(cancelled),
                Err(err) => warn!(task = %id, error = %err, "shutdown: could not cancel task"),
            }
        }

        info!(
            scheduler = %self.config.name,
            drain_pending,
            cancelled = step.newly_cancelled.len(),
            remaining = self.stats.outstanding(),
            "scheduler closed to new submissions"
        );
        step
    }
}

// src/dag/state_manager.rs

//! Task state transitions and their knock-on effects on the graph.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dag::DependencyGraph;
use crate::dag::scheduler_step::{SchedulerStats, SchedulerStep};
use crate::dag::task_info::{TaskOutcome, TaskRecord, TaskState};
use crate::engine::queue::ReadyQueue;
use crate::errors::{Result, SchedulerError};
use crate::types::{CancelledDependency, TaskId};

/// Applies state transitions to task records, keeping the ready queue, the
/// graph's readiness counters and the per-state stats in sync.
///
/// Every state change goes through [`StateManager::transition`], which
/// enforces the state machine.
pub struct StateManager<'a, T> {
    tasks: &'a mut HashMap<TaskId, TaskRecord<T>>,
    graph: &'a mut DependencyGraph,
    queue: &'a mut ReadyQueue,
    stats: &'a mut SchedulerStats,
    policy: CancelledDependency,
}

impl<'a, T> StateManager<'a, T> {
    pub fn new(
        tasks: &'a mut HashMap<TaskId, TaskRecord<T>>,
        graph: &'a mut DependencyGraph,
        queue: &'a mut ReadyQueue,
        stats: &'a mut SchedulerStats,
        policy: CancelledDependency,
    ) -> Self {
        Self {
            tasks,
            graph,
            queue,
            stats,
            policy,
        }
    }

    /// Whether a dependency in `state` counts as finished for its dependents.
    pub fn satisfies_dependents(policy: CancelledDependency, state: TaskState) -> bool {
        match state {
            TaskState::Completed => true,
            TaskState::Cancelled => policy == CancelledDependency::Satisfy,
            _ => false,
        }
    }

    /// Whether a dependency in `state` dooms its dependents to cancellation.
    pub fn dooms_dependents(policy: CancelledDependency, state: TaskState) -> bool {
        match state {
            TaskState::Failed => true,
            TaskState::Cancelled => policy == CancelledDependency::Cancel,
            _ => false,
        }
    }

    /// Move `id` to `to`, returning the previous state.
    pub fn transition(&mut self, id: TaskId, to: TaskState) -> Result<TaskState> {
        let record = self
            .tasks
            .get_mut(&id)
            .ok_or(SchedulerError::NotFound(id))?;
        let from = record.state;

        if !from.can_transition_to(to) {
            return Err(SchedulerError::InvalidStateTransition { task: id, from, to });
        }

        record.state = to;
        self.stats.moved(from, to);
        debug!(task = %record.display_name(), ?from, ?to, "task state transition");
        Ok(from)
    }

    /// `Pending -> Ready`, and push onto the ready queue.
    ///
    /// Placeholders and tasks that are no longer `Pending` are left alone.
    pub fn mark_ready(&mut self, id: TaskId, step: &mut SchedulerStep) -> Result<()> {
        let (priority, seq) = match self.tasks.get(&id) {
            Some(record) if record.state == TaskState::Pending && !record.placeholder => {
                (record.priority, record.seq)
            }
            Some(_) => return Ok(()),
            None => return Err(SchedulerError::NotFound(id)),
        };

        self.transition(id, TaskState::Ready)?;
        self.queue.push(id, priority, seq);
        step.newly_ready.push(id);
        Ok(())
    }

    /// Record the outcome reported by the worker for a `Running` task and
    /// propagate it to dependents.
    pub fn finish(&mut self, id: TaskId, outcome: TaskOutcome<T>) -> Result<SchedulerStep> {
        let to = outcome.state();
        self.transition(id, to)?;

        if let Some(record) = self.tasks.get_mut(&id) {
            match to {
                TaskState::Completed => {
                    info!(task = %record.display_name(), "task completed")
                }
                TaskState::Failed => {
                    warn!(task = %record.display_name(), "task failed; cancelling dependents")
                }
                _ => info!(task = %record.display_name(), "task cancelled while running"),
            }
            record.publish(outcome, Instant::now());
        }

        let mut step = SchedulerStep::default();
        self.propagate(id, to, &mut step)?;
        Ok(step)
    }

    /// Explicit cancellation.
    ///
    /// - `Pending`/`Ready`: cancelled immediately and propagated.
    /// - `Running`: only the cancel flag is set.
    /// - terminal: no-op.
    ///
    /// Returns the task's state after the call.
    pub fn cancel(&mut self, id: TaskId) -> Result<(TaskState, SchedulerStep)> {
        let state = self
            .tasks
            .get(&id)
            .map(|record| record.state)
            .ok_or(SchedulerError::NotFound(id))?;

        let mut step = SchedulerStep::default();

        match state {
            TaskState::Pending | TaskState::Ready => {
                self.cancel_one(id, &mut step)?;
                self.propagate(id, TaskState::Cancelled, &mut step)?;
                Ok((TaskState::Cancelled, step))
            }
            TaskState::Running => {
                if let Some(record) = self.tasks.get(&id) {
                    if record.cancel.request() {
                        info!(
                            task = %record.display_name(),
                            "cancellation requested for running task"
                        );
                        step.cancel_requested.push(id);
                    }
                }
                Ok((TaskState::Running, step))
            }
            terminal => {
                debug!(task = %id, state = ?terminal, "cancel on terminal task; nothing to do");
                Ok((terminal, step))
            }
        }
    }

    /// Cancel every non-terminal task downstream of `root`, breadth-first.
    ///
    /// Queued dependents are pulled from the ready queue. A running
    /// dependent only gets its flag set.
    pub fn cancel_dependents(&mut self, root: TaskId, step: &mut SchedulerStep) -> Result<()> {
        for id in self.graph.transitive_dependents(root) {
            let state = match self.tasks.get(&id) {
                Some(record) => record.state,
                None => continue,
            };

            match state {
                TaskState::Pending | TaskState::Ready => {
                    self.cancel_one(id, step)?;
                    debug!(task = %id, upstream = %root, "dependent cancelled due to upstream");
                }
                TaskState::Running => {
                    if let Some(record) = self.tasks.get(&id) {
                        if record.cancel.request() {
                            step.cancel_requested.push(id);
                        }
                    }
                }
                TaskState::Completed | TaskState::Failed | TaskState::Cancelled => {}
            }
        }
        Ok(())
    }

    /// Cancel a single `Pending`/`Ready` task without touching dependents.
    fn cancel_one(&mut self, id: TaskId, step: &mut SchedulerStep) -> Result<()> {
        self.queue.remove(id);
        self.transition(id, TaskState::Cancelled)?;
        if let Some(record) = self.tasks.get_mut(&id) {
            record.cancel.request();
            record.publish(TaskOutcome::Cancelled, Instant::now());
        }
        step.newly_cancelled.push(id);
        Ok(())
    }

    /// Apply the effect of `root` reaching the terminal state `state`.
    fn propagate(&mut self, root: TaskId, state: TaskState, step: &mut SchedulerStep) -> Result<()> {
        if Self::satisfies_dependents(self.policy, state) {
            for id in self.graph.satisfy(root) {
                self.mark_ready(id, step)?;
            }
        } else if Self::dooms_dependents(self.policy, state) {
            self.cancel_dependents(root, step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::task_info::TaskFailure;
    use crate::exec::{BoxedJob, CancelToken};
    use crate::types::Priority;

    struct Fixture {
        tasks: HashMap<TaskId, TaskRecord<u32>>,
        graph: DependencyGraph,
        queue: ReadyQueue,
        stats: SchedulerStats,
    }

    fn noop() -> BoxedJob<u32> {
        Box::new(|_token: CancelToken| async { Ok::<u32, anyhow::Error>(0) })
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tasks: HashMap::new(),
                graph: DependencyGraph::new(),
                queue: ReadyQueue::new(),
                stats: SchedulerStats::default(),
            }
        }

        /// Insert a pending task with the given deps (all unsatisfied).
        fn add(&mut self, n: u64, deps: &[u64]) -> TaskId {
            let id = TaskId::new(n);
            let deps: Vec<TaskId> = deps.iter().copied().map(TaskId::new).collect();
            self.graph.add_task(id, &deps, |_| false).unwrap();
            let mut record = TaskRecord::placeholder(id);
            record.fill(noop(), Priority::Default, n, deps, None);
            self.tasks.insert(id, record);
            self.stats.add(TaskState::Pending);
            id
        }

        fn manager(&mut self, policy: CancelledDependency) -> StateManager<'_, u32> {
            StateManager::new(
                &mut self.tasks,
                &mut self.graph,
                &mut self.queue,
                &mut self.stats,
                policy,
            )
        }

        fn state(&self, n: u64) -> TaskState {
            self.tasks[&TaskId::new(n)].state
        }

        /// Pending -> Ready -> Running for a root task.
        fn start(&mut self, n: u64) {
            let id = TaskId::new(n);
            let mut step = SchedulerStep::default();
            let mut mgr = self.manager(CancelledDependency::Cancel);
            mgr.mark_ready(id, &mut step).unwrap();
            mgr.transition(id, TaskState::Running).unwrap();
            self.queue.remove(id);
        }
    }

    #[test]
    fn rejects_backward_transition() {
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        fx.start(1);

        let err = fx
            .manager(CancelledDependency::Cancel)
            .transition(a, TaskState::Ready)
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidStateTransition {
                from: TaskState::Running,
                to: TaskState::Ready,
                ..
            }
        ));
    }

    #[test]
    fn completion_unlocks_dependents_in_order() {
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        fx.add(2, &[1]);
        fx.add(3, &[1]);
        fx.start(1);

        let step = fx
            .manager(CancelledDependency::Cancel)
            .finish(a, TaskOutcome::Completed(7))
            .unwrap();

        assert_eq!(step.newly_ready, vec![TaskId::new(2), TaskId::new(3)]);
        assert_eq!(fx.state(2), TaskState::Ready);
        assert_eq!(fx.queue.pop(), Some(TaskId::new(2)));
        assert_eq!(fx.stats.completed, 1);
        assert_eq!(fx.stats.ready, 2);
    }

    #[test]
    fn failure_cancels_transitive_dependents_only() {
        //   1 -> 2 -> 3      4 (independent sibling)
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        fx.add(2, &[1]);
        fx.add(3, &[2]);
        fx.add(4, &[]);
        fx.start(1);

        let outcome = TaskOutcome::Failed(TaskFailure::Panicked("boom".into()));
        let step = fx
            .manager(CancelledDependency::Cancel)
            .finish(a, outcome)
            .unwrap();

        assert_eq!(step.newly_cancelled, vec![TaskId::new(2), TaskId::new(3)]);
        assert_eq!(fx.state(1), TaskState::Failed);
        assert_eq!(fx.state(3), TaskState::Cancelled);
        assert_eq!(fx.state(4), TaskState::Pending);
    }

    #[test]
    fn failure_cancels_even_under_satisfy_policy() {
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        fx.add(2, &[1]);
        fx.start(1);

        let outcome = TaskOutcome::Failed(TaskFailure::Panicked("boom".into()));
        fx.manager(CancelledDependency::Satisfy)
            .finish(a, outcome)
            .unwrap();

        assert_eq!(fx.state(2), TaskState::Cancelled);
    }

    #[test]
    fn cancelling_ready_task_removes_it_from_queue() {
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        let mut step = SchedulerStep::default();
        fx.manager(CancelledDependency::Cancel)
            .mark_ready(a, &mut step)
            .unwrap();
        assert!(fx.queue.contains(a));

        let (state, _) = fx.manager(CancelledDependency::Cancel).cancel(a).unwrap();
        assert_eq!(state, TaskState::Cancelled);
        assert!(!fx.queue.contains(a));
        assert!(fx.tasks[&a].outcome().is_some());
    }

    #[test]
    fn cancelled_dependency_is_satisfied_under_satisfy_policy() {
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        fx.add(2, &[1]);

        let (_, step) = fx
            .manager(CancelledDependency::Satisfy)
            .cancel(a)
            .unwrap();

        assert_eq!(step.newly_cancelled, vec![a]);
        assert_eq!(step.newly_ready, vec![TaskId::new(2)]);
        assert_eq!(fx.state(2), TaskState::Ready);
    }

    #[test]
    fn cancel_running_only_sets_flag_once() {
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        fx.start(1);

        let (state, step) = fx.manager(CancelledDependency::Cancel).cancel(a).unwrap();
        assert_eq!(state, TaskState::Running);
        assert_eq!(step.cancel_requested, vec![a]);
        assert!(fx.tasks[&a].cancel.is_cancelled());

        let (_, again) = fx.manager(CancelledDependency::Cancel).cancel(a).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn cancel_terminal_is_noop() {
        let mut fx = Fixture::new();
        let a = fx.add(1, &[]);
        fx.start(1);
        fx.manager(CancelledDependency::Cancel)
            .finish(a, TaskOutcome::Completed(1))
            .unwrap();

        let (state, step) = fx.manager(CancelledDependency::Cancel).cancel(a).unwrap();
        assert_eq!(state, TaskState::Completed);
        assert!(step.is_empty());
    }
}

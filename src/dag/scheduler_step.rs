// src/dag/scheduler_step.rs

//! Step results and state counters for the scheduler.

use crate::dag::task_info::TaskState;
use crate::types::TaskId;

/// Structured result of a single scheduler "step" (a submission, a
/// completion, a cancellation).
///
/// The async façade only uses it to decide whether workers need waking;
/// tests use it to assert exactly what a step changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Tasks that moved `Pending -> Ready` during this step.
    pub newly_ready: Vec<TaskId>,
    /// Tasks that were cancelled during this step, including the task that
    /// was cancelled explicitly and every dependent cancelled in cascade.
    pub newly_cancelled: Vec<TaskId>,
    /// Running tasks whose cancel flag was set during this step. They stay
    /// `Running` until their worker reports back.
    pub cancel_requested: Vec<TaskId>,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_ready.is_empty()
            && self.newly_cancelled.is_empty()
            && self.cancel_requested.is_empty()
    }

    pub fn merge(&mut self, mut other: SchedulerStep) {
        self.newly_ready.append(&mut other.newly_ready);
        self.newly_cancelled.append(&mut other.newly_cancelled);
        self.cancel_requested.append(&mut other.cancel_requested);
    }
}

/// Number of retained tasks in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl SchedulerStats {
    /// Tasks that have not reached a terminal state.
    pub fn outstanding(&self) -> usize {
        self.pending + self.ready + self.running
    }

    pub fn total(&self) -> usize {
        self.outstanding() + self.completed + self.failed + self.cancelled
    }

    pub fn count(&self, state: TaskState) -> usize {
        match state {
            TaskState::Pending => self.pending,
            TaskState::Ready => self.ready,
            TaskState::Running => self.running,
            TaskState::Completed => self.completed,
            TaskState::Failed => self.failed,
            TaskState::Cancelled => self.cancelled,
        }
    }

    fn slot(&mut self, state: TaskState) -> &mut usize {
        match state {
            TaskState::Pending => &mut self.pending,
            TaskState::Ready => &mut self.ready,
            TaskState::Running => &mut self.running,
            TaskState::Completed => &mut self.completed,
            TaskState::Failed => &mut self.failed,
            TaskState::Cancelled => &mut self.cancelled,
        }
    }

    pub(crate) fn add(&mut self, state: TaskState) {
        *self.slot(state) += 1;
    }

    pub(crate) fn remove(&mut self, state: TaskState) {
        let slot = self.slot(state);
        *slot = slot.saturating_sub(1);
    }

    pub(crate) fn moved(&mut self, from: TaskState, to: TaskState) {
        self.remove(from);
        self.add(to);
    }
}

// src/engine/queue.rs

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::types::{Priority, TaskId};

/// Ordering key: highest priority first, then lowest submission sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: Reverse<Priority>,
    seq: u64,
    id: TaskId,
}

/// Queue of tasks whose dependencies are all complete.
///
/// Semantics:
/// - Strict priority: a `Background` task is never handed out while any
///   higher-priority task is queued.
/// - FIFO within a priority band, by submission sequence (not by the time
///   the task became ready).
/// - `remove` is O(log n), so cancelling a queued task does not require a
///   scan.
///
/// The queue itself never blocks; workers wait for it at the scheduler level.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    order: BTreeSet<QueueKey>,
    index: HashMap<TaskId, QueueKey>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    /// Enqueue a task. Returns `false` (and changes nothing) if it is
    /// already queued.
    pub fn push(&mut self, id: TaskId, priority: Priority, seq: u64) -> bool {
        if self.index.contains_key(&id) {
            warn!(task = %id, "task already in ready queue; ignoring push");
            return false;
        }

        let key = QueueKey {
            rank: Reverse(priority),
            seq,
            id,
        };
        self.order.insert(key);
        self.index.insert(id, key);
        debug!(task = %id, ?priority, seq, queued = self.order.len(), "task queued as ready");
        true
    }

    /// Take the next task to dispatch.
    pub fn pop(&mut self) -> Option<TaskId> {
        let key = self.order.pop_first()?;
        self.index.remove(&key.id);
        Some(key.id)
    }

    /// The task `pop` would return, without removing it.
    pub fn peek(&self) -> Option<TaskId> {
        self.order.first().map(|key| key.id)
    }

    /// Remove a queued task (e.g. on cancellation). Returns whether it was
    /// present.
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.index.remove(&id) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Remove every queued task, in dispatch order.
    pub fn drain(&mut self) -> Vec<TaskId> {
        self.index.clear();
        let drained: Vec<TaskId> = std::mem::take(&mut self.order)
            .into_iter()
            .map(|key| key.id)
            .collect();
        debug!(drained = drained.len(), "drained ready queue");
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> TaskId {
        TaskId::new(n)
    }

    #[test]
    fn higher_priority_first_regardless_of_submission() {
        let mut q = ReadyQueue::new();
        q.push(id(1), Priority::Background, 1);
        q.push(id(2), Priority::Default, 2);
        q.push(id(3), Priority::Critical, 3);
        q.push(id(4), Priority::UserInitiated, 4);

        assert_eq!(q.pop(), Some(id(3)));
        assert_eq!(q.pop(), Some(id(4)));
        assert_eq!(q.pop(), Some(id(2)));
        assert_eq!(q.pop(), Some(id(1)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn fifo_within_a_band() {
        let mut q = ReadyQueue::new();
        // Pushed out of order: readiness order differs from submission order.
        q.push(id(3), Priority::Default, 30);
        q.push(id(1), Priority::Default, 10);
        q.push(id(2), Priority::Default, 20);

        assert_eq!(q.peek(), Some(id(1)));
        assert_eq!(q.drain(), vec![id(1), id(2), id(3)]);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_skips_cancelled_task() {
        let mut q = ReadyQueue::new();
        q.push(id(1), Priority::Default, 1);
        q.push(id(2), Priority::Default, 2);

        assert!(q.remove(id(1)));
        assert!(!q.remove(id(1)));
        assert!(!q.contains(id(1)));
        assert_eq!(q.pop(), Some(id(2)));
    }

    #[test]
    fn duplicate_push_is_ignored() {
        let mut q = ReadyQueue::new();
        assert!(q.push(id(1), Priority::Default, 1));
        assert!(!q.push(id(1), Priority::Critical, 1));
        assert_eq!(q.len(), 1);
    }
}

// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, SchedulerError};
use crate::types::TaskId;

/// In-memory dependency graph keyed by task id.
///
/// Edge direction is `dependency -> dependent`: for a task B submitted with
/// dependencies `[A]` we add edge A -> B. Alongside the edges we keep, per
/// node, the number of dependencies that have not been satisfied yet, so that
/// readiness is an O(1) counter check rather than a scan.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: DiGraphMap<TaskId, ()>,
    unsatisfied: HashMap<TaskId, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.edges.contains_node(id)
    }

    pub fn len(&self) -> usize {
        self.edges.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.node_count() == 0
    }

    /// Register a node with no dependencies yet (a reserved id).
    pub fn add_placeholder(&mut self, id: TaskId) {
        self.edges.add_node(id);
        self.unsatisfied.entry(id).or_insert(0);
    }

    /// Register `id` with the given dependencies.
    ///
    /// `is_satisfied` tells the graph which dependencies already count as
    /// finished; the returned value is how many are still outstanding.
    ///
    /// Fails without touching the graph if a dependency is unknown or if the
    /// new edges would close a cycle. A fresh id has no dependents and can
    /// never close one; a reserved id may already have dependents, in which
    /// case any dependency reachable from it is rejected.
    pub fn add_task(
        &mut self,
        id: TaskId,
        deps: &[TaskId],
        is_satisfied: impl Fn(TaskId) -> bool,
    ) -> Result<usize> {
        let mut unique: Vec<TaskId> = Vec::with_capacity(deps.len());
        let mut seen: HashSet<TaskId> = HashSet::new();

        for &dep in deps {
            if !seen.insert(dep) {
                continue;
            }
            if dep == id {
                return Err(SchedulerError::CyclicDependency {
                    task: id,
                    dependency: dep,
                });
            }
            if !self.edges.contains_node(dep) {
                return Err(SchedulerError::UnknownDependency(dep));
            }
            if self.edges.contains_node(id) && has_path_connecting(&self.edges, id, dep, None) {
                return Err(SchedulerError::CyclicDependency {
                    task: id,
                    dependency: dep,
                });
            }
            unique.push(dep);
        }

        self.edges.add_node(id);
        let mut outstanding = 0;
        for dep in unique {
            self.edges.add_edge(dep, id, ());
            if !is_satisfied(dep) {
                outstanding += 1;
            }
        }
        self.unsatisfied.insert(id, outstanding);

        Ok(outstanding)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        if !self.edges.contains_node(id) {
            return Vec::new();
        }
        self.edges
            .neighbors_directed(id, Direction::Incoming)
            .collect()
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        if !self.edges.contains_node(id) {
            return Vec::new();
        }
        self.edges
            .neighbors_directed(id, Direction::Outgoing)
            .collect()
    }

    /// Dependencies of `id` that are still outstanding.
    pub fn unsatisfied(&self, id: TaskId) -> usize {
        self.unsatisfied.get(&id).copied().unwrap_or(0)
    }

    /// Record that `id` no longer blocks its dependents.
    ///
    /// Returns the dependents whose outstanding count dropped to zero with
    /// this call, in ascending id order.
    pub fn satisfy(&mut self, id: TaskId) -> Vec<TaskId> {
        let mut unblocked = Vec::new();

        for dependent in self.dependents_of(id) {
            if let Some(count) = self.unsatisfied.get_mut(&dependent) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        unblocked.push(dependent);
                    }
                }
            }
        }

        unblocked.sort();
        unblocked
    }

    /// Every task reachable from `id` along dependent edges, breadth-first,
    /// excluding `id` itself.
    pub fn transitive_dependents(&self, id: TaskId) -> Vec<TaskId> {
        let mut order = Vec::new();
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut queue: VecDeque<TaskId> = VecDeque::new();

        visited.insert(id);
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            let mut next = self.dependents_of(current);
            next.sort();
            for dependent in next {
                if visited.insert(dependent) {
                    order.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }

        order
    }

    /// Drop a node and all of its edges.
    pub fn remove(&mut self, id: TaskId) {
        self.edges.remove_node(id);
        self.unsatisfied.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> TaskId {
        TaskId::new(n)
    }

    fn never(_: TaskId) -> bool {
        false
    }

    #[test]
    fn counts_outstanding_dependencies() {
        let mut g = DependencyGraph::new();
        g.add_task(id(1), &[], never).unwrap();
        g.add_task(id(2), &[], never).unwrap();
        let outstanding = g.add_task(id(3), &[id(1), id(2), id(1)], |d| d == id(2)).unwrap();

        assert_eq!(outstanding, 1);
        assert_eq!(g.unsatisfied(id(3)), 1);
        let mut deps = g.dependencies_of(id(3));
        deps.sort();
        assert_eq!(deps, vec![id(1), id(2)]);
    }

    #[test]
    fn unknown_dependency_leaves_graph_unchanged() {
        let mut g = DependencyGraph::new();
        g.add_task(id(1), &[], never).unwrap();

        let err = g.add_task(id(2), &[id(1), id(9)], never).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownDependency(d) if d == id(9)));
        assert!(!g.contains(id(2)));
        assert!(g.dependents_of(id(1)).is_empty());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut g = DependencyGraph::new();
        g.add_placeholder(id(1));
        let err = g.add_task(id(1), &[id(1)], never).unwrap_err();
        assert!(matches!(err, SchedulerError::CyclicDependency { .. }));
    }

    #[test]
    fn filling_a_placeholder_cannot_close_a_cycle() {
        // 1 is reserved, 2 depends on 1, 3 depends on 2; filling 1 with a
        // dependency on 3 would close 1 -> 2 -> 3 -> 1.
        let mut g = DependencyGraph::new();
        g.add_placeholder(id(1));
        g.add_task(id(2), &[id(1)], never).unwrap();
        g.add_task(id(3), &[id(2)], never).unwrap();

        let err = g.add_task(id(1), &[id(3)], never).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::CyclicDependency { task, dependency } if task == id(1) && dependency == id(3)
        ));
        assert!(g.dependencies_of(id(1)).is_empty());
        assert_eq!(g.dependents_of(id(3)), Vec::<TaskId>::new());
    }

    #[test]
    fn satisfy_unblocks_when_counter_reaches_zero() {
        //     1
        //    / \
        //   2   3
        //    \ /
        //     4
        let mut g = DependencyGraph::new();
        g.add_task(id(1), &[], never).unwrap();
        g.add_task(id(2), &[id(1)], never).unwrap();
        g.add_task(id(3), &[id(1)], never).unwrap();
        g.add_task(id(4), &[id(2), id(3)], never).unwrap();

        assert_eq!(g.satisfy(id(1)), vec![id(2), id(3)]);
        assert!(g.satisfy(id(2)).is_empty());
        assert_eq!(g.satisfy(id(3)), vec![id(4)]);
    }

    #[test]
    fn transitive_dependents_are_breadth_first() {
        let mut g = DependencyGraph::new();
        g.add_task(id(1), &[], never).unwrap();
        g.add_task(id(2), &[id(1)], never).unwrap();
        g.add_task(id(3), &[id(1)], never).unwrap();
        g.add_task(id(4), &[id(2)], never).unwrap();
        g.add_task(id(5), &[id(4), id(3)], never).unwrap();
        g.add_task(id(6), &[], never).unwrap();

        assert_eq!(g.transitive_dependents(id(1)), vec![id(2), id(3), id(4), id(5)]);
        assert!(g.transitive_dependents(id(6)).is_empty());
    }

    #[test]
    fn remove_drops_edges() {
        let mut g = DependencyGraph::new();
        g.add_task(id(1), &[], never).unwrap();
        g.add_task(id(2), &[id(1)], |_| true).unwrap();
        g.remove(id(1));

        assert!(!g.contains(id(1)));
        assert!(g.dependencies_of(id(2)).is_empty());
        assert_eq!(g.len(), 1);
    }
}

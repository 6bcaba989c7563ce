use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use proptest::prelude::*;

use dagqueue::dag::{TaskFailure, TaskOutcome, TaskState};
use dagqueue::engine::SchedulerCore;
use dagqueue::{CancelToken, NewTask, TaskId};
use dagqueue_test_utils::config_with_workers;

/// A random DAG: task `i` may only depend on tasks `0..i`.
#[derive(Debug, Clone)]
struct Dag {
    deps: Vec<BTreeSet<usize>>,
    failing: BTreeSet<usize>,
}

fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Dag> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), num_tasks),
            proptest::collection::btree_set(0..num_tasks, 0..3),
        )
            .prop_map(|(raw_deps, failing)| {
                let deps = raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, candidates)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            candidates.into_iter().map(|d| d % i).collect()
                        }
                    })
                    .collect();
                Dag { deps, failing }
            })
    })
}

fn noop() -> NewTask<u32> {
    NewTask::new(|_token: CancelToken| async { Ok::<u32, anyhow::Error>(0) })
}

proptest! {
    #[test]
    fn test_core_respects_dependencies_and_concurrency(
        dag in dag_strategy(20),
        workers in 1..4usize,
        picks in proptest::collection::vec(any::<usize>(), 64),
    ) {
        let mut core: SchedulerCore<u32> = SchedulerCore::new(config_with_workers(workers));
        let mut ids: Vec<TaskId> = Vec::new();
        for deps in &dag.deps {
            let task = noop().depends_on_all(deps.iter().map(|&d| ids[d]));
            let (id, _) = core.submit(task).unwrap();
            ids.push(id);
        }
        let index_of: HashMap<TaskId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut running: Vec<TaskId> = Vec::new();
        let mut steps = 0;
        loop {
            // Fill free worker slots.
            while running.len() < workers {
                let Some(dispatch) = core.dispatch_next() else { break };
                let i = index_of[&dispatch.id];
                for &d in &dag.deps[i] {
                    prop_assert_eq!(core.status(ids[d]).unwrap(), TaskState::Completed);
                }
                running.push(dispatch.id);
            }
            prop_assert!(core.stats().running <= workers);

            if running.is_empty() {
                break;
            }

            let pick = picks[steps % picks.len()] % running.len();
            let id = running.swap_remove(pick);
            let outcome = if dag.failing.contains(&index_of[&id]) {
                TaskOutcome::Failed(TaskFailure::Error(Arc::new(anyhow::anyhow!("injected"))))
            } else {
                TaskOutcome::Completed(1)
            };
            core.finish(id, outcome).unwrap();
            steps += 1;
        }

        // Everything reached a terminal state.
        prop_assert_eq!(core.stats().outstanding(), 0);

        // A task completed iff it did not fail and all its deps completed;
        // otherwise it was cancelled (or failed itself).
        for (i, id) in ids.iter().enumerate() {
            let state = core.status(*id).unwrap();
            let deps_ok = dag.deps[i]
                .iter()
                .all(|&d| core.status(ids[d]).unwrap() == TaskState::Completed);
            let expected = match (deps_ok, dag.failing.contains(&i)) {
                (false, _) => TaskState::Cancelled,
                (true, true) => TaskState::Failed,
                (true, false) => TaskState::Completed,
            };
            prop_assert_eq!(state, expected, "task {} with deps {:?}", i, dag.deps[i]);
        }
    }

    #[test]
    fn test_cancel_reaches_every_transitive_dependent(
        dag in dag_strategy(15),
        victim in any::<usize>(),
    ) {
        let mut core: SchedulerCore<u32> = SchedulerCore::new(config_with_workers(1));
        let mut ids: Vec<TaskId> = Vec::new();
        for deps in &dag.deps {
            let (id, _) = core.submit(noop().depends_on_all(deps.iter().map(|&d| ids[d]))).unwrap();
            ids.push(id);
        }

        let victim = victim % ids.len();
        let (state, _) = core.cancel(ids[victim]).unwrap();
        prop_assert_eq!(state, TaskState::Cancelled);

        // Cancelling twice changes nothing.
        let before = core.stats();
        let (again, step) = core.cancel(ids[victim]).unwrap();
        prop_assert_eq!(again, TaskState::Cancelled);
        prop_assert!(step.is_empty());
        prop_assert_eq!(core.stats(), before);

        // Compute the downstream cone by hand.
        let mut doomed = BTreeSet::from([victim]);
        for i in 0..ids.len() {
            if dag.deps[i].iter().any(|d| doomed.contains(d)) {
                doomed.insert(i);
            }
        }
        for (i, id) in ids.iter().enumerate() {
            let state = core.status(*id).unwrap();
            if doomed.contains(&i) {
                prop_assert_eq!(state, TaskState::Cancelled);
            } else {
                prop_assert_ne!(state, TaskState::Cancelled);
            }
        }
    }
}

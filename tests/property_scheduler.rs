use std::collections::{BTreeSet, HashSet};

use filedag::dag::{DagGraph, Scheduler, TaskRunState};
use filedag::engine::TaskOutcome;
use proptest::prelude::*;

/// A random DAG over `t0..tN`: every edge points from a lower to a higher
/// index, plus the set of tasks whose single run fails.
fn dag_strategy() -> impl Strategy<Value = (Vec<(String, Vec<String>)>, BTreeSet<usize>)> {
    (1usize..12).prop_flat_map(|n| {
        let edges = proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n);
        let failing = proptest::collection::btree_set(0..n, 0..=n.min(3));
        (edges, failing).prop_map(move |(edges, failing)| {
            let entries = (0..n)
                .map(|i| {
                    let deps = (0..i)
                        .filter(|&j| edges[i][j])
                        .map(|j| format!("t{j}"))
                        .collect();
                    (format!("t{i}"), deps)
                })
                .collect();
            (entries, failing)
        })
    })
}

proptest! {
    #[test]
    fn every_task_ends_done_or_blocked(
        (entries, failing) in dag_strategy()
    ) {
        let graph = DagGraph::from_follows(entries.clone()).unwrap();
        let mut scheduler = Scheduler::new(graph);
        let failing: HashSet<String> = failing.iter().map(|i| format!("t{i}")).collect();

        let mut ready: Vec<String> = scheduler.start_run(&[]).into_iter().map(|t| t.name).collect();
        let mut started: HashSet<String> = HashSet::new();
        let mut succeeded: HashSet<String> = HashSet::new();

        while let Some(task) = ready.pop() {
            prop_assert!(started.insert(task.clone()), "{} scheduled twice", task);
            let deps = &entries.iter().find(|(n, _)| *n == task).unwrap().1;
            for dep in deps {
                prop_assert!(succeeded.contains(dep), "{} started before {}", task, dep);
            }

            let outcome = if failing.contains(&task) {
                TaskOutcome::Failed
            } else {
                succeeded.insert(task.clone());
                TaskOutcome::Success
            };
            ready.extend(scheduler.handle_completion(&task, outcome).into_iter().map(|t| t.name));
        }

        prop_assert!(scheduler.is_idle());
        for (name, deps) in &entries {
            let state = scheduler.run_state_of(name).unwrap();
            if started.contains(name) {
                let expected = if failing.contains(name) {
                    TaskRunState::DoneFailed
                } else {
                    TaskRunState::DoneSuccess
                };
                prop_assert_eq!(state, expected);
            } else {
                prop_assert_eq!(state, TaskRunState::Blocked);
                prop_assert!(!deps.is_empty());
            }
        }
    }

    #[test]
    fn ranks_increase_along_every_edge((entries, _) in dag_strategy()) {
        let graph = DagGraph::from_follows(entries.clone()).unwrap();
        for (name, deps) in &entries {
            for dep in deps {
                prop_assert!(graph.rank(dep) < graph.rank(name));
            }
        }
        let order = graph.topological_order();
        prop_assert_eq!(order.len(), entries.len());
    }
}

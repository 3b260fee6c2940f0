// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::dag::DagGraph;
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DagGraph, tasks: &'a mut HashMap<TaskName, TaskInfo>) -> Self {
        Self { graph, tasks }
    }

    /// Include a requested task and everything it transitively follows in
    /// this run. Tasks already in the run keep their state.
    pub fn mark_with_dependencies_pending(&mut self, root: &str) {
        let mut stack: Vec<TaskName> = vec![root.to_string()];
        let mut visited: HashSet<TaskName> = HashSet::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            if let Some(info) = self.tasks.get_mut(&name) {
                if info.run_state.is_none() {
                    info.run_state = Some(RunState::Pending);
                    debug!(task = %info.name, "marked Pending for this run");
                }
                stack.extend(self.graph.dependencies_of(&name).iter().cloned());
            } else {
                warn!(task = %name, "node in DAG not present in tasks map");
            }
        }
    }

    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        ReadOnlyStateManager::new(self.tasks).deps_satisfied_for_info(info)
    }

    /// Mark every pending dependent (transitively) of a failed task as
    /// blocked by it. Returns the newly blocked tasks.
    pub fn mark_dependents_blocked(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();
        let mut newly_blocked = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(info) = self.tasks.get_mut(&name) {
                if matches!(info.run_state, Some(RunState::Pending)) {
                    info.run_state = Some(RunState::Blocked {
                        by: failed_task.to_string(),
                    });
                    debug!(
                        task = %info.name,
                        by = %failed_task,
                        "marking dependent as Blocked due to upstream failure"
                    );
                    newly_blocked.push(info.name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
            }
        }

        newly_blocked.sort();
        newly_blocked
    }

    /// Collect `Pending` tasks whose dependencies are satisfied, mark them
    /// `Running` and return them in (rank, name) order.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        // Decide first, then mutate to avoid borrowing issues.
        let mut candidates: Vec<(usize, TaskName)> = self
            .tasks
            .values()
            .filter(|info| {
                matches!(info.run_state, Some(RunState::Pending))
                    && self.deps_satisfied_for_info(info)
            })
            .map(|info| (info.rank, info.name.clone()))
            .collect();
        candidates.sort();

        let mut ready = Vec::with_capacity(candidates.len());
        for (_, name) in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                info!(task = %info.name, rank = info.rank, "dependencies satisfied; scheduling task");
                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask::from_task_info(info));
            }
        }
        ready
    }

    /// Mark every `Pending` task `Skipped`. Returns them sorted.
    pub fn skip_pending(&mut self) -> Vec<TaskName> {
        let mut skipped: Vec<TaskName> = self
            .tasks
            .values_mut()
            .filter(|info| matches!(info.run_state, Some(RunState::Pending)))
            .map(|info| {
                info.run_state = Some(RunState::Skipped);
                info.name.clone()
            })
            .collect();
        skipped.sort();
        skipped
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks
            .values()
            .all(|info| info.run_state.as_ref().is_none_or(RunState::is_terminal))
    }
}

/// Read-only view for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// A task may start once every task it follows finished successfully in
    /// this run.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.tasks.get(dep_name) {
            Some(dep) => matches!(dep.run_state, Some(RunState::DoneSuccess)),
            None => {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                false
            }
        })
    }
}

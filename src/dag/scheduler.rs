// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is responsible for:
/// - remembering which tasks are part of the current run
/// - deciding when a task is ready (every task it follows is done)
/// - blocking dependents when a task fails
/// - skipping what has not started when the run is aborted
///
/// It knows nothing about Matches: the engine reports a task complete once
/// all of its Matches are.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    active: bool,
}

impl Scheduler {
    pub fn new(graph: DagGraph) -> Self {
        let tasks = graph
            .tasks()
            .map(|name| {
                let deps = graph.dependencies_of(name).to_vec();
                let rank = graph.rank(name).unwrap_or(0);
                (name.to_string(), TaskInfo::new(name.to_string(), deps, rank))
            })
            .collect();

        Self {
            graph,
            tasks,
            active: false,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Returns `true` if there is no active run.
    pub fn is_idle(&self) -> bool {
        !self.active
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.as_ref().into())
    }

    /// The failed task that blocked `task`, if it is blocked.
    pub fn blocked_by(&self, task: &str) -> Option<&str> {
        match self.tasks.get(task)?.run_state.as_ref()? {
            RunState::Blocked { by } => Some(by),
            _ => None,
        }
    }

    /// Start a run for `targets` and everything they follow; an empty list
    /// selects every task. Unknown names are ignored with a warning.
    pub fn start_run(&mut self, targets: &[TaskName]) -> Vec<ScheduledTask> {
        self.start_run_step(targets).newly_scheduled
    }

    pub fn start_run_step(&mut self, targets: &[TaskName]) -> SchedulerStep {
        if !self.active {
            for info in self.tasks.values_mut() {
                info.run_state = None;
            }
            self.active = true;
            debug!(?targets, "scheduler: starting new run");
        }

        let roots: Vec<TaskName> = if targets.is_empty() {
            self.graph.tasks().map(str::to_string).collect()
        } else {
            targets.to_vec()
        };

        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        for root in &roots {
            if self.graph.contains(root) {
                manager.mark_with_dependencies_pending(root);
            } else {
                warn!(task = %root, "run requested for unknown task; ignoring");
            }
        }
        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    /// Record that every Match of `task` is done (production API).
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.step_completion(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `handle_completion`.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if !self.active {
            warn!(task = %task, "completion with no active run; ignoring");
            return step;
        }

        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return step;
        };

        if !matches!(info.run_state, Some(RunState::Running)) {
            warn!(task = %task, state = ?info.run_state, "completion for task that is not running; ignoring");
            return step;
        }

        match outcome {
            TaskOutcome::Success => {
                info.run_state = Some(RunState::DoneSuccess);
                debug!(task = %task, "task completed successfully");
                let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                step.newly_scheduled = manager.collect_new_ready_tasks();
            }
            TaskOutcome::Failed => {
                info.run_state = Some(RunState::DoneFailed);
                warn!(task = %task, "task failed; blocking dependents");
                step.newly_failed.push(task.to_string());
                let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                step.newly_blocked = manager
                    .mark_dependents_blocked(task)
                    .into_iter()
                    .map(|blocked| (blocked, task.to_string()))
                    .collect();
            }
            TaskOutcome::Skipped => {
                info.run_state = Some(RunState::Skipped);
                debug!(task = %task, "task skipped");
            }
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// Stop scheduling: every task still `Pending` becomes `Skipped`.
    /// Running tasks are left to report their completion.
    pub fn abort(&mut self) -> Vec<TaskName> {
        if !self.active {
            return Vec::new();
        }
        let skipped = StateManager::new(&self.graph, &mut self.tasks).skip_pending();
        info!(skipped = skipped.len(), "scheduler: run aborted");
        self.maybe_finish_run();
        skipped
    }

    fn maybe_finish_run(&mut self) -> bool {
        if !self.active {
            return false;
        }
        let manager = StateManager::new(&self.graph, &mut self.tasks);
        if manager.all_tasks_terminal() {
            info!("scheduler: all tasks terminal; run finished");
            self.active = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(edges: &[(&str, &[&str])]) -> Scheduler {
        let graph = DagGraph::from_follows(edges.iter().map(|(n, d)| {
            (n.to_string(), d.iter().map(|s| s.to_string()).collect())
        }))
        .unwrap();
        Scheduler::new(graph)
    }

    fn names(tasks: &[ScheduledTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn requesting_a_task_pulls_in_its_dependencies_only() {
        let mut s = scheduler(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("x", &[])]);
        let ready = s.start_run(&["b".to_string()]);
        assert_eq!(names(&ready), vec!["a"]);
        assert_eq!(s.run_state_of("b"), Some(TaskRunState::Pending));
        assert_eq!(s.run_state_of("c"), Some(TaskRunState::NotInRun));
        assert_eq!(s.run_state_of("x"), Some(TaskRunState::NotInRun));

        let ready = s.handle_completion("a", TaskOutcome::Success);
        assert_eq!(names(&ready), vec!["b"]);
        let step = s.step_completion("b", TaskOutcome::Success);
        assert!(step.run_just_finished);
        assert!(s.is_idle());
    }

    #[test]
    fn ready_tasks_come_in_rank_then_name_order() {
        let mut s = scheduler(&[("z", &[]), ("a", &[]), ("m", &[])]);
        assert_eq!(names(&s.start_run(&[])), vec!["a", "m", "z"]);
    }

    #[test]
    fn failure_blocks_transitive_dependents_but_not_siblings() {
        let mut s = scheduler(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("x", &[]),
            ("y", &["x"]),
        ]);
        s.start_run(&[]);
        let step = s.step_completion("a", TaskOutcome::Failed);
        assert_eq!(step.newly_failed, vec!["a".to_string()]);
        assert_eq!(
            step.newly_blocked,
            vec![("b".to_string(), "a".to_string()), ("c".to_string(), "a".to_string())]
        );
        assert_eq!(s.blocked_by("c"), Some("a"));
        assert!(!s.is_idle());

        let ready = s.handle_completion("x", TaskOutcome::Success);
        assert_eq!(names(&ready), vec!["y"]);
        let step = s.step_completion("y", TaskOutcome::Success);
        assert!(step.run_just_finished);
    }

    #[test]
    fn abort_skips_pending_and_waits_for_running() {
        let mut s = scheduler(&[("a", &[]), ("b", &["a"])]);
        s.start_run(&[]);
        assert_eq!(s.abort(), vec!["b".to_string()]);
        assert!(!s.is_idle());
        let step = s.step_completion("a", TaskOutcome::Success);
        assert!(step.newly_scheduled.is_empty());
        assert!(step.run_just_finished);
    }
}

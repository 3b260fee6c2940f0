// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - planning ready tasks against the filesystem
//! - sending jobs to the executor
//! - handling Ctrl+C / shutdown
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_match_completed, handle_run_requested, handle_shutdown, handle_task_planned,
    CoreStep, RunLedger,
};
use crate::engine::report::RunReport;
use crate::engine::RuntimeEvent;

/// Pure core runtime state.
///
/// This owns:
/// - the DAG scheduler
/// - the run ledger (Matches in flight plus the report)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    ledger: RunLedger,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            ledger: RunLedger::default(),
        }
    }

    /// Expose whether the scheduler is idle (for tests).
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report(&self) -> &RunReport {
        self.ledger.report()
    }

    pub fn into_report(self) -> RunReport {
        self.ledger.into_report()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::RunRequested { targets } => {
                handle_run_requested(&mut self.scheduler, &mut self.ledger, targets)
            }
            RuntimeEvent::TaskPlanned { task, plan } => {
                handle_task_planned(&mut self.scheduler, &mut self.ledger, task, plan)
            }
            RuntimeEvent::MatchCompleted { key, outcome } => {
                handle_match_completed(&mut self.scheduler, &mut self.ledger, key, outcome)
            }
            RuntimeEvent::ShutdownRequested => {
                handle_shutdown(&mut self.scheduler, &mut self.ledger)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::dag::{DagGraph, TaskRunState};
    use crate::engine::{
        Completion, CoreCommand, EntryState, FailureReason, MatchOutcome, PlannedMatch,
    };
    use crate::exec::{Invocation, Job};
    use crate::rules::{Captures, Match, MatchKey, ResourceProfile};

    fn core(edges: &[(&str, &[&str])]) -> CoreRuntime {
        let graph = DagGraph::from_follows(edges.iter().map(|(n, d)| {
            (n.to_string(), d.iter().map(|s| s.to_string()).collect())
        }))
        .unwrap();
        CoreRuntime::new(Scheduler::new(graph))
    }

    fn job(task: &str, input: &str) -> Box<Job> {
        let m = Match {
            task: task.into(),
            inputs: vec![PathBuf::from(input)],
            aux: vec![],
            outputs: vec![PathBuf::from(format!("{input}.out"))],
            captures: Captures::default(),
        };
        Box::new(Job {
            key: m.key(),
            invocation: Invocation {
                command: format!("process {input}"),
                workdir: PathBuf::from("."),
                env: vec![],
                resources: ResourceProfile::default(),
            },
            m,
            mkdirs: vec![],
            timeout: None,
            log_file: PathBuf::from("log"),
        })
    }

    fn key(task: &str, id: &str) -> MatchKey {
        MatchKey {
            task: task.into(),
            id: id.into(),
        }
    }

    fn planned_tasks(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::PlanTasks(tasks) => Some(tasks.iter().map(|t| t.name.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn dispatched(step: &CoreStep) -> usize {
        step.commands
            .iter()
            .map(|c| match c {
                CoreCommand::DispatchJobs(jobs) => jobs.len(),
                _ => 0,
            })
            .sum()
    }

    fn ok(duration_ms: u64) -> MatchOutcome {
        MatchOutcome::Succeeded {
            duration: Duration::from_millis(duration_ms),
        }
    }

    #[test]
    fn dependent_task_waits_for_every_match() {
        let mut c = core(&[("a", &[]), ("b", &["a"])]);

        let step = c.step(RuntimeEvent::RunRequested { targets: vec![] });
        assert_eq!(planned_tasks(&step), vec!["a"]);

        let step = c.step(RuntimeEvent::TaskPlanned {
            task: "a".into(),
            plan: Ok(vec![
                PlannedMatch::Stale(job("a", "s1")),
                PlannedMatch::Stale(job("a", "s2")),
            ]),
        });
        assert_eq!(dispatched(&step), 2);

        let step = c.step(RuntimeEvent::MatchCompleted {
            key: key("a", "s1"),
            outcome: ok(5),
        });
        assert!(planned_tasks(&step).is_empty());

        let step = c.step(RuntimeEvent::MatchCompleted {
            key: key("a", "s2"),
            outcome: ok(5),
        });
        assert_eq!(planned_tasks(&step), vec!["b"]);

        let step = c.step(RuntimeEvent::TaskPlanned {
            task: "b".into(),
            plan: Ok(vec![PlannedMatch::UpToDate(key("b", "s1.out"))]),
        });
        assert!(!step.keep_running);
        assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
        assert_eq!(c.report().exit_code(), 0);
        assert_eq!(c.report().counts().up_to_date, 1);
    }

    #[test]
    fn failed_match_blocks_followers_but_not_siblings() {
        let mut c = core(&[("a", &[]), ("b", &["a"]), ("x", &[])]);
        let step = c.step(RuntimeEvent::RunRequested { targets: vec![] });
        assert_eq!(planned_tasks(&step), vec!["a", "x"]);

        c.step(RuntimeEvent::TaskPlanned {
            task: "a".into(),
            plan: Ok(vec![PlannedMatch::Stale(job("a", "s1"))]),
        });
        c.step(RuntimeEvent::TaskPlanned {
            task: "x".into(),
            plan: Ok(vec![PlannedMatch::Stale(job("x", "s1"))]),
        });

        c.step(RuntimeEvent::MatchCompleted {
            key: key("a", "s1"),
            outcome: MatchOutcome::Failed {
                reason: FailureReason::Exit(1),
                duration: Duration::from_millis(1),
            },
        });
        assert_eq!(c.scheduler().run_state_of("b"), Some(TaskRunState::Blocked));
        assert_eq!(
            c.report().find("b", None).map(|e| &e.state),
            Some(&EntryState::Blocked { by: "a".into() })
        );

        let step = c.step(RuntimeEvent::MatchCompleted {
            key: key("x", "s1"),
            outcome: ok(3),
        });
        assert!(!step.keep_running);
        assert_eq!(
            c.report().find("x", Some("s1")).map(|e| &e.state),
            Some(&EntryState::Succeeded(Completion::Ran))
        );
        assert_eq!(c.report().exit_code(), 1);
    }

    #[test]
    fn missing_input_fails_the_task_branch() {
        let mut c = core(&[("a", &[]), ("b", &["a"])]);
        c.step(RuntimeEvent::RunRequested { targets: vec![] });
        let step = c.step(RuntimeEvent::TaskPlanned {
            task: "a".into(),
            plan: Err(FailureReason::MissingInput),
        });
        assert!(!step.keep_running);
        let counts = c.report().counts();
        assert_eq!((counts.failed, counts.blocked), (1, 1));
    }

    #[test]
    fn abort_skips_pending_and_cancels_in_flight() {
        let mut c = core(&[("a", &[]), ("b", &["a"])]);
        c.step(RuntimeEvent::RunRequested { targets: vec![] });
        c.step(RuntimeEvent::TaskPlanned {
            task: "a".into(),
            plan: Ok(vec![
                PlannedMatch::Stale(job("a", "s1")),
                PlannedMatch::Stale(job("a", "s2")),
            ]),
        });

        let step = c.step(RuntimeEvent::ShutdownRequested);
        assert!(step.keep_running);
        assert!(step.commands.iter().any(|c| matches!(c, CoreCommand::CancelInFlight)));
        assert_eq!(c.scheduler().run_state_of("b"), Some(TaskRunState::Skipped));

        c.step(RuntimeEvent::MatchCompleted {
            key: key("a", "s1"),
            outcome: MatchOutcome::Failed {
                reason: FailureReason::Cancelled,
                duration: Duration::from_millis(1),
            },
        });
        let step = c.step(RuntimeEvent::MatchCompleted {
            key: key("a", "s2"),
            outcome: MatchOutcome::NotStarted,
        });
        assert!(!step.keep_running);

        let counts = c.report().counts();
        assert_eq!((counts.failed, counts.skipped), (1, 2));
        assert_eq!(c.report().exit_code(), 1);
    }

    #[test]
    fn target_without_matches_completes_immediately() {
        let mut c = core(&[("a", &[]), ("all", &["a"])]);
        c.step(RuntimeEvent::RunRequested {
            targets: vec!["all".into()],
        });
        c.step(RuntimeEvent::TaskPlanned {
            task: "a".into(),
            plan: Ok(vec![]),
        });
        let step = c.step(RuntimeEvent::TaskPlanned {
            task: "all".into(),
            plan: Ok(vec![]),
        });
        assert!(!step.keep_running);
        assert!(c.report().is_success());
    }

    #[test]
    fn stray_completion_is_ignored() {
        let mut c = core(&[("a", &[])]);
        c.step(RuntimeEvent::RunRequested { targets: vec![] });
        let step = c.step(RuntimeEvent::MatchCompleted {
            key: key("a", "nope"),
            outcome: ok(1),
        });
        assert!(step.keep_running);
        assert!(c.report().entries().is_empty());
    }
}

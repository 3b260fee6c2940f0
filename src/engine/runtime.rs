// src/engine/runtime.rs

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::exec::{ExecutorBackend, Job};
use crate::rules::{Match, MatchKey};

use super::core::CoreRuntime;
use super::planner::Planner;
use super::report::{FailureReason, RunReport};
use super::{CoreCommand, MatchOutcome, RuntimeEvent, TaskName};

/// Drives the DAG scheduler in response to `RuntimeEvent`s, plans ready
/// tasks against the filesystem and delegates execution to an
/// `ExecutorBackend`.
///
/// This is the IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. Planning results are fed back into the core as
/// `TaskPlanned` events before anything else is read from the channel.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    planner: Planner,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    backlog: VecDeque<RuntimeEvent>,
    /// Matches handed to the executor, for recording successes.
    dispatched: HashMap<MatchKey, Match>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("backlog", &self.backlog.len())
            .field("dispatched", &self.dispatched.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        planner: Planner,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            planner,
            event_rx,
            executor,
            backlog: VecDeque::new(),
            dispatched: HashMap::new(),
        }
    }

    /// Run `targets` (every task when empty) to completion.
    ///
    /// - Consumes `RuntimeEvent`s from the backlog, then from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (plan, dispatch, cancel).
    pub async fn run(mut self, targets: Vec<TaskName>) -> Result<RunReport> {
        info!("filedag runtime started");
        self.backlog.push_back(RuntimeEvent::RunRequested { targets });

        loop {
            let event = match self.backlog.pop_front() {
                Some(e) => e,
                None => match self.event_rx.recv().await {
                    Some(e) => e,
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                },
            };

            debug!(?event, "runtime received event");

            if let RuntimeEvent::MatchCompleted { key, outcome } = &event {
                self.note_completion(key, outcome);
            }

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core.into_report())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::PlanTasks(tasks) => self.plan_ready(tasks).await,
            CoreCommand::DispatchJobs(jobs) => self.dispatch(jobs).await?,
            CoreCommand::CancelInFlight => self.executor.cancel_all().await?,
            CoreCommand::RequestExit => info!("core issued RequestExit command"),
        }
        Ok(())
    }

    /// Planning scans the filesystem, so it runs on the blocking pool.
    async fn plan_ready(&mut self, tasks: Vec<ScheduledTask>) {
        for task in tasks {
            let planner = self.planner.clone();
            let name = task.name.clone();
            let plan = tokio::task::spawn_blocking(move || planner.plan(&name))
                .await
                .unwrap_or_else(|e| Err(FailureReason::Planning(format!("planner panicked: {e}"))));
            self.backlog.push_back(RuntimeEvent::TaskPlanned {
                task: task.name,
                plan,
            });
        }
    }

    async fn dispatch(&mut self, jobs: Vec<Job>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = jobs.iter().map(|j| j.key.to_string()).collect();
        debug!(?keys, "dispatching jobs");

        for job in &jobs {
            self.dispatched.insert(job.key.clone(), job.m.clone());
        }
        self.executor.dispatch(jobs).await
    }

    fn note_completion(&mut self, key: &MatchKey, outcome: &MatchOutcome) {
        let Some(m) = self.dispatched.remove(key) else {
            return;
        };
        if matches!(outcome, MatchOutcome::Succeeded { .. }) {
            if let Err(e) = self.planner.record_success(&m) {
                warn!(job = %key, error = %e, "failed to record successful match");
            }
        }
    }
}

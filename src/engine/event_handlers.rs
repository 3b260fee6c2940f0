// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep, TaskRunState};
use crate::engine::report::{Completion, EntryState, FailureReason, ReportEntry, RunReport};
use crate::engine::{MatchOutcome, PlannedMatch, TaskName, TaskOutcome, TaskPlan};
use crate::exec::Job;
use crate::rules::MatchKey;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Enumerate and check the Matches of these ready tasks.
    PlanTasks(Vec<ScheduledTask>),
    /// Send these stale Matches to the executor.
    DispatchJobs(Vec<Job>),
    /// Stop everything the executor has queued or running.
    CancelInFlight,
    /// The run is over.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Matches of a running task that have not reported back yet.
#[derive(Debug, Default)]
struct TaskProgress {
    outstanding: HashSet<MatchKey>,
    failed: bool,
    skipped: bool,
}

impl TaskProgress {
    fn outcome(&self) -> TaskOutcome {
        if self.failed {
            TaskOutcome::Failed
        } else if self.skipped {
            TaskOutcome::Skipped
        } else {
            TaskOutcome::Success
        }
    }
}

/// Per-run bookkeeping the scheduler does not do: Matches in flight and the
/// report.
#[derive(Debug, Default)]
pub struct RunLedger {
    inflight: HashMap<TaskName, TaskProgress>,
    report: RunReport,
    aborting: bool,
}

impl RunLedger {
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Number of dispatched Matches that have not completed.
    pub fn matches_in_flight(&self) -> usize {
        self.inflight.values().map(|p| p.outstanding.len()).sum()
    }

    fn record(&mut self, task: &str, match_id: Option<String>, state: EntryState) {
        self.record_timed(task, match_id, state, None);
    }

    fn record_timed(
        &mut self,
        task: &str,
        match_id: Option<String>,
        state: EntryState,
        duration: Option<std::time::Duration>,
    ) {
        self.report.record(ReportEntry {
            task: task.to_string(),
            match_id,
            state,
            duration,
        });
    }
}

/// Start a run for `targets` (all tasks when empty).
pub fn handle_run_requested(
    scheduler: &mut Scheduler,
    ledger: &mut RunLedger,
    targets: Vec<TaskName>,
) -> CoreStep {
    let mut commands = Vec::new();

    if ledger.aborting {
        warn!(?targets, "run requested after abort; ignoring");
        return finish(scheduler, commands);
    }

    info!(?targets, "run requested");
    let step = scheduler.start_run_step(&targets);
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::PlanTasks(step.newly_scheduled));
    }

    finish(scheduler, commands)
}

/// Turn a ready task's plan into dispatches and report entries.
///
/// A task with nothing left to run completes immediately, which may make
/// further tasks ready.
pub fn handle_task_planned(
    scheduler: &mut Scheduler,
    ledger: &mut RunLedger,
    task: TaskName,
    plan: TaskPlan,
) -> CoreStep {
    let mut commands = Vec::new();

    if scheduler.run_state_of(&task) != Some(TaskRunState::Running) {
        warn!(task = %task, "plan for a task that is not running; ignoring");
        return finish(scheduler, commands);
    }

    let planned = match plan {
        Ok(planned) => planned,
        Err(reason) => {
            warn!(task = %task, reason = %reason, "task failed before dispatch");
            ledger.record(&task, None, EntryState::Failed(reason));
            complete_task(scheduler, ledger, &task, TaskOutcome::Failed, &mut commands);
            return finish(scheduler, commands);
        }
    };

    let mut progress = TaskProgress::default();
    let mut jobs = Vec::new();
    for pm in planned {
        match pm {
            PlannedMatch::UpToDate(key) => {
                debug!(task = %task, id = %key.id, "match up to date");
                ledger.record(&task, Some(key.id), EntryState::Succeeded(Completion::UpToDate));
            }
            PlannedMatch::Unrenderable { key, reason } => {
                progress.failed = true;
                ledger.record(&task, Some(key.id), EntryState::Failed(FailureReason::Render(reason)));
            }
            PlannedMatch::Stale(job) => {
                if ledger.aborting {
                    progress.skipped = true;
                    ledger.record(&task, Some(job.key.id.clone()), EntryState::Skipped);
                } else {
                    progress.outstanding.insert(job.key.clone());
                    jobs.push(*job);
                }
            }
        }
    }

    if !jobs.is_empty() {
        info!(task = %task, matches = jobs.len(), "dispatching stale matches");
        commands.push(CoreCommand::DispatchJobs(jobs));
    }

    if progress.outstanding.is_empty() {
        let outcome = progress.outcome();
        complete_task(scheduler, ledger, &task, outcome, &mut commands);
    } else {
        ledger.inflight.insert(task, progress);
    }

    finish(scheduler, commands)
}

/// Record a finished Match; the last one completes its task.
pub fn handle_match_completed(
    scheduler: &mut Scheduler,
    ledger: &mut RunLedger,
    key: MatchKey,
    outcome: MatchOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    let Some(progress) = ledger.inflight.get_mut(&key.task) else {
        warn!(job = %key, "completion for a task with nothing in flight; ignoring");
        return finish(scheduler, commands);
    };
    if !progress.outstanding.remove(&key) {
        warn!(job = %key, "completion for a match that was not dispatched; ignoring");
        return finish(scheduler, commands);
    }

    let (state, duration) = match outcome {
        MatchOutcome::Succeeded { duration } => {
            (EntryState::Succeeded(Completion::Ran), Some(duration))
        }
        MatchOutcome::Failed { reason, duration } => {
            progress.failed = true;
            (EntryState::Failed(reason), Some(duration))
        }
        MatchOutcome::NotStarted => {
            progress.skipped = true;
            (EntryState::Skipped, None)
        }
    };
    let done = progress.outstanding.is_empty();
    let task_outcome = progress.outcome();
    ledger.record_timed(&key.task, Some(key.id.clone()), state, duration);

    if done {
        ledger.inflight.remove(&key.task);
        complete_task(scheduler, ledger, &key.task, task_outcome, &mut commands);
    }

    finish(scheduler, commands)
}

/// Abort: nothing new starts, what has not started is skipped and running
/// processes are cancelled.
pub fn handle_shutdown(scheduler: &mut Scheduler, ledger: &mut RunLedger) -> CoreStep {
    let mut commands = Vec::new();

    if ledger.aborting {
        debug!("abort already in progress");
        return finish(scheduler, commands);
    }
    ledger.aborting = true;

    for task in scheduler.abort() {
        ledger.record(&task, None, EntryState::Skipped);
    }
    if !ledger.inflight.is_empty() {
        info!(matches = ledger.matches_in_flight(), "cancelling matches in flight");
        commands.push(CoreCommand::CancelInFlight);
    }

    finish(scheduler, commands)
}

fn complete_task(
    scheduler: &mut Scheduler,
    ledger: &mut RunLedger,
    task: &str,
    outcome: TaskOutcome,
    commands: &mut Vec<CoreCommand>,
) {
    info!(task = %task, ?outcome, "task finished");
    let SchedulerStep {
        newly_scheduled,
        newly_blocked,
        ..
    } = scheduler.step_completion(task, outcome);

    for (blocked, by) in newly_blocked {
        ledger.record(&blocked, None, EntryState::Blocked { by });
    }
    if !newly_scheduled.is_empty() {
        commands.push(CoreCommand::PlanTasks(newly_scheduled));
    }
}

fn finish(scheduler: &Scheduler, mut commands: Vec<CoreCommand>) -> CoreStep {
    let keep_running = !scheduler.is_idle();
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    }
    CoreStep {
        commands,
        keep_running,
    }
}

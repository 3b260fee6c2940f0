// src/engine/mod.rs

//! Orchestration engine for filedag.
//!
//! This module ties together:
//! - the DAG scheduler (which tasks may start)
//! - the planner (which Matches of a ready task are stale)
//! - the main runtime event loop that reacts to:
//!   - run requests
//!   - planned tasks
//!   - Match completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use crate::exec::Job;
use crate::rules::MatchKey;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a whole task (all of its Matches) for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
    /// Never attempted because the run was aborted.
    Skipped,
}

/// Outcome of one dispatched Match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Succeeded { duration: Duration },
    Failed { reason: FailureReason, duration: Duration },
    /// Cancelled before its process was launched.
    NotStarted,
}

/// What planning found for one Match of a ready task.
#[derive(Debug, Clone)]
pub enum PlannedMatch {
    UpToDate(MatchKey),
    Stale(Box<Job>),
    /// The command could not be rendered for this Match.
    Unrenderable { key: MatchKey, reason: String },
}

/// Result of planning a ready task; an error fails the whole task.
pub type TaskPlan = std::result::Result<Vec<PlannedMatch>, FailureReason>;

/// Events flowing into the runtime from the CLI, the planner and executors.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Run these tasks and everything they follow; empty means all tasks.
    RunRequested { targets: Vec<TaskName> },
    /// A ready task's Matches were enumerated and checked.
    TaskPlanned { task: TaskName, plan: TaskPlan },
    /// A dispatched Match finished.
    MatchCompleted { key: MatchKey, outcome: MatchOutcome },
    /// Abort requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod planner;
pub mod report;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use planner::{Planner, PlannerOptions};
pub use report::{Completion, EntryState, FailureReason, ReportEntry, RunReport};
pub use runtime::Runtime;

// src/dag/task_info.rs

//! Task metadata and per-run state.

use crate::engine::TaskName;

/// Per-run state of a task (internal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Part of this run, waiting on dependencies.
    Pending,
    /// Handed to the engine; its Matches are being planned or executed.
    Running,
    /// Every Match ended Succeeded.
    DoneSuccess,
    /// At least one Match failed, or planning failed.
    DoneFailed,
    /// Not attempted because an upstream task failed.
    Blocked { by: TaskName },
    /// Not attempted because the run was aborted.
    Skipped,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Pending | RunState::Running)
    }
}

/// Public, read-only view of a task's per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The task is not part of this run.
    NotInRun,
    Pending,
    Running,
    DoneSuccess,
    DoneFailed,
    Blocked,
    Skipped,
}

impl From<Option<&RunState>> for TaskRunState {
    fn from(state: Option<&RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::DoneSuccess) => TaskRunState::DoneSuccess,
            Some(RunState::DoneFailed) => TaskRunState::DoneFailed,
            Some(RunState::Blocked { .. }) => TaskRunState::Blocked,
            Some(RunState::Skipped) => TaskRunState::Skipped,
        }
    }
}

/// Static task information plus per-run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    /// Direct dependencies (the task's `follows`).
    pub deps: Vec<TaskName>,
    pub rank: usize,
    /// `None` when the task is not part of the current run.
    pub run_state: Option<RunState>,
}

impl TaskInfo {
    pub fn new(name: TaskName, deps: Vec<TaskName>, rank: usize) -> Self {
        Self {
            name,
            deps,
            rank,
            run_state: None,
        }
    }
}

/// A task whose dependencies are all done; the engine should plan it now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub rank: usize,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            name: info.name.clone(),
            rank: info.rank,
        }
    }
}

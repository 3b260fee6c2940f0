// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// Structured result of a single scheduler "step".
///
/// Tests use it to step the DAG by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready as a result of this step, in (rank, name) order.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks newly marked failed in this step (only the task that failed).
    pub newly_failed: Vec<TaskName>,
    /// Tasks newly blocked, each with the failed task that blocked it.
    pub newly_blocked: Vec<(TaskName, TaskName)>,
    /// Whether this step finished the run (the scheduler is now idle).
    pub run_just_finished: bool,
}

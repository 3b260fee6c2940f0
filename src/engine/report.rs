// src/engine/report.rs

//! Terminal state of every Match (or task) touched by a run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::TaskName;

/// How a Succeeded entry got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Ran,
    /// Outputs were already newer than the inputs; nothing was invoked.
    UpToDate,
}

/// Why a Match (or a whole task) failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Exit(i32),
    Signal(i32),
    Timeout(Duration),
    Cancelled,
    Io(String),
    OutputMissing(PathBuf),
    Render(String),
    /// The task requires at least one input and none matched.
    MissingInput,
    /// Matches could not be enumerated.
    Planning(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exit(code) => write!(f, "exit status {code}"),
            FailureReason::Signal(sig) => write!(f, "killed by signal {sig}"),
            FailureReason::Timeout(limit) => write!(f, "timed out after {limit:?}"),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::Io(msg) => write!(f, "io error: {msg}"),
            FailureReason::OutputMissing(path) => {
                write!(f, "output '{}' missing after success", path.display())
            }
            FailureReason::Render(msg) => write!(f, "cannot render command: {msg}"),
            FailureReason::MissingInput => write!(f, "no input matched"),
            FailureReason::Planning(msg) => write!(f, "cannot enumerate matches: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Succeeded(Completion),
    Failed(FailureReason),
    Blocked { by: TaskName },
    Skipped,
}

impl EntryState {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, EntryState::Succeeded(_))
    }
}

/// One line of the report. Entries without a `match_id` describe a whole
/// task that never got as far as enumerating Matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub task: TaskName,
    pub match_id: Option<String>,
    pub state: EntryState,
    pub duration: Option<Duration>,
}

impl ReportEntry {
    pub fn label(&self) -> String {
        match &self.match_id {
            Some(id) => format!("{}[{}]", self.task, id),
            None => self.task.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub succeeded: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Entries of one task, in the order they were recorded.
    pub fn for_task<'a>(&'a self, task: &'a str) -> impl Iterator<Item = &'a ReportEntry> + 'a {
        self.entries.iter().filter(move |e| e.task == task)
    }

    /// The entry for `task` and `match_id` (`None` for task-level entries).
    pub fn find(&self, task: &str, match_id: Option<&str>) -> Option<&ReportEntry> {
        self.entries
            .iter()
            .find(|e| e.task == task && e.match_id.as_deref() == match_id)
    }

    /// Number of Matches whose command was actually invoked.
    pub fn invocations(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.state,
                    EntryState::Succeeded(Completion::Ran) | EntryState::Failed(_)
                ) && e.duration.is_some()
            })
            .count()
    }

    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for entry in &self.entries {
            match &entry.state {
                EntryState::Succeeded(Completion::Ran) => counts.succeeded += 1,
                EntryState::Succeeded(Completion::UpToDate) => {
                    counts.succeeded += 1;
                    counts.up_to_date += 1;
                }
                EntryState::Failed(_) => counts.failed += 1,
                EntryState::Blocked { .. } => counts.blocked += 1,
                EntryState::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.state.is_succeeded())
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// One-line count summary.
    pub fn summary(&self) -> String {
        let c = self.counts();
        format!(
            "{} succeeded ({} up to date), {} failed, {} blocked, {} skipped",
            c.succeeded, c.up_to_date, c.failed, c.blocked, c.skipped
        )
    }
}

impl fmt::Display for RunReport {
    /// Summary line followed by every entry that did not succeed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for entry in &self.entries {
            match &entry.state {
                EntryState::Succeeded(_) => {}
                EntryState::Failed(reason) => writeln!(f, "  FAILED   {}: {reason}", entry.label())?,
                EntryState::Blocked { by } => {
                    writeln!(f, "  BLOCKED  {}: by failed task '{by}'", entry.label())?
                }
                EntryState::Skipped => writeln!(f, "  SKIPPED  {}", entry.label())?,
            }
        }
        Ok(())
    }
}

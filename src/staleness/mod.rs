// src/staleness/mod.rs

//! Deciding which Matches must run.
//!
//! - [`enumerate`] applies a task's input specification to the filesystem.
//! - [`mtime`] is the default modification-time rule.
//! - [`hash`] compares content digests recorded at the last success.
//!
//! Both rules sit behind [`StalenessCheck`], so the rest of the engine does
//! not know which one is in use.

use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::model::ConfigSection;
use crate::errors::Result;
use crate::fs::Workspace;
use crate::rules::Match;
use crate::types::{HashStorageMode, StalenessMode};

pub mod enumerate;
pub mod hash;
pub mod mtime;

pub use enumerate::enumerate;
pub use hash::{FileHashStore, HashCheck, HashStore, MemoryHashStore};
pub use mtime::MtimeCheck;

/// Why a Match has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The task declares no outputs, so nothing records a previous run.
    NoOutputs,
    OutputMissing(PathBuf),
    InputMissing(PathBuf),
    InputNewer { input: PathBuf, output: PathBuf },
    /// No digest recorded for this Match yet.
    NoRecord,
    InputsChanged,
    /// The rule itself could not be evaluated; the Match runs anyway.
    CheckFailed(String),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NoOutputs => write!(f, "no outputs declared"),
            StaleReason::OutputMissing(p) => write!(f, "output '{}' missing", p.display()),
            StaleReason::InputMissing(p) => write!(f, "input '{}' missing", p.display()),
            StaleReason::InputNewer { input, output } => write!(
                f,
                "input '{}' newer than output '{}'",
                input.display(),
                output.display()
            ),
            StaleReason::NoRecord => write!(f, "no digest recorded"),
            StaleReason::InputsChanged => write!(f, "input digest changed"),
            StaleReason::CheckFailed(msg) => write!(f, "staleness check failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    UpToDate,
    Stale(StaleReason),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale(_))
    }
}

/// A staleness rule.
pub trait StalenessCheck: Send + Sync + Debug {
    fn check(&self, ws: &Workspace, m: &Match) -> Result<Staleness>;

    /// Called after a Match succeeded; rules with their own state update it.
    fn record_success(&self, _ws: &Workspace, _m: &Match) -> Result<()> {
        Ok(())
    }
}

/// Shared precondition of both rules: every output must exist.
pub(crate) fn missing_output(ws: &Workspace, m: &Match) -> Option<Staleness> {
    if m.outputs.is_empty() {
        return Some(Staleness::Stale(StaleReason::NoOutputs));
    }
    m.outputs
        .iter()
        .find(|out| !ws.exists(out))
        .map(|out| Staleness::Stale(StaleReason::OutputMissing(out.clone())))
}

/// Build the rule selected by `[config]`.
pub fn checker_for(config: &ConfigSection) -> Arc<dyn StalenessCheck> {
    match config.staleness {
        StalenessMode::Mtime => Arc::new(MtimeCheck),
        StalenessMode::Hash => {
            let store: Box<dyn HashStore> = match config.hash_storage {
                HashStorageMode::File => Box::new(FileHashStore::default()),
                HashStorageMode::Memory => Box::new(MemoryHashStore::default()),
            };
            Arc::new(HashCheck::new(store))
        }
    }
}

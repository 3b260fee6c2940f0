// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Errors in this enum are the ones that stop a run (configuration, cycles)
//! or that fail a whole task while planning it (missing input). Failures of
//! individual Matches are recorded in the run report as
//! [`FailureReason`](crate::engine::FailureReason) instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FiledagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing required configuration key '{0}'")]
    MissingKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task declaration: {0}")]
    DuplicateTask(String),

    #[error("Cycle detected in task graph: {}", format_cycle(.0))]
    DagCycle(Vec<String>),

    #[error("Task '{0}' requires at least one input but none matched")]
    MissingInput(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// `a -> b -> c -> a`
fn format_cycle(members: &[String]) -> String {
    let mut parts: Vec<&str> = members.iter().map(String::as_str).collect();
    if let Some(first) = members.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FiledagError>;

// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::engine::TaskName;

/// Command-line arguments for `filedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "filedag",
    version,
    about = "Run file-driven pipelines: rebuild outputs whose inputs changed, in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline definition (TOML).
    #[arg(long, value_name = "PATH", default_value = "Filedag.toml")]
    pub pipeline: PathBuf,

    /// Override `[config].jobs` (worker slots).
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FILEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print every task and target with its rank and dependencies.
    List,
    /// Run tasks (and everything they follow); no name runs every task.
    Make {
        #[arg(value_name = "TASK")]
        targets: Vec<TaskName>,
    },
    /// Show which Matches of the selected tasks are stale, without running.
    Plan {
        #[arg(value_name = "TASK")]
        targets: Vec<TaskName>,
    },
    /// Print the resolved configuration mapping.
    Config,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod rules;
pub mod staleness;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::params::display_value;
use crate::config::Params;
use crate::dag::Scheduler;
use crate::engine::{CoreRuntime, Planner, PlannerOptions, Runtime, RuntimeEvent, TaskName};
use crate::errors::FiledagError;
use crate::exec::{ExecutorSettings, RealExecutorBackend};
use crate::fs::{RealFileSystem, Workspace};
use crate::pipeline::{load_pipeline, Pipeline};
use crate::staleness::{checker_for, Staleness};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - pipeline loading and configuration resolution
/// - scheduler / planner / runtime
/// - executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let file = load_and_validate(&args.pipeline)?;
    let pipeline = load_pipeline(&RealFileSystem, &file, &args.pipeline)?;
    let config = file.config_section();

    let workspace = Workspace::real(std::env::current_dir()?);
    let planner = Planner::new(
        Arc::new(pipeline),
        workspace.clone(),
        checker_for(config),
        PlannerOptions::from_config(config),
    );

    match args.command {
        Command::List => {
            print_tasks(planner.pipeline());
            Ok(0)
        }
        Command::Config => {
            print_params(planner.pipeline().params());
            Ok(0)
        }
        Command::Plan { targets } => {
            print_plan(&planner, &targets)?;
            Ok(0)
        }
        Command::Make { targets } => {
            let jobs = args.jobs.unwrap_or(config.jobs);
            if jobs == 0 {
                return Err(FiledagError::ConfigError("--jobs must be at least 1".into()).into());
            }
            make(planner, workspace, jobs, targets).await
        }
    }
}

async fn make(planner: Planner, workspace: Workspace, jobs: usize, targets: Vec<TaskName>) -> Result<i32> {
    let selection = planner.pipeline().selection(&targets)?;
    info!(?targets, tasks = selection.len(), jobs, "starting run");

    let scheduler = Scheduler::new(planner.pipeline().graph().clone());

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let executor = RealExecutorBackend::new(rt_tx.clone(), ExecutorSettings { jobs, workspace });

    // Ctrl-C → abort.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let runtime = Runtime::new(CoreRuntime::new(scheduler), planner, rt_rx, executor);
    let report = runtime.run(targets).await?;

    print!("{report}");
    Ok(report.exit_code())
}

fn print_tasks(pipeline: &Pipeline) {
    for rule in pipeline.rules() {
        let rank = pipeline.graph().rank(rule.name()).unwrap_or(0);
        let kind = if rule.is_target() { "target" } else { "task" };
        let follows = rule.decl.follows.join(", ");
        if follows.is_empty() {
            println!("{rank:>3}  {kind:<6}  {}", rule.name());
        } else {
            println!("{rank:>3}  {kind:<6}  {}  (follows: {follows})", rule.name());
        }
    }
}

fn print_params(params: &Params) {
    for (key, value) in params.iter() {
        let shown = display_value(value).unwrap_or_else(|| value.to_string());
        println!("{key} = {shown}");
    }
}

fn print_plan(planner: &Planner, targets: &[TaskName]) -> Result<()> {
    let pipeline = planner.pipeline();
    let selection = pipeline.selection(targets)?;

    for rule in pipeline.rules().filter(|r| selection.contains(r.name())) {
        if rule.is_target() {
            println!("{}: target", rule.name());
            continue;
        }
        let evaluated = planner.preview(rule.name())?;
        if evaluated.is_empty() {
            println!("{}: no matches", rule.name());
        }
        for (m, staleness) in evaluated {
            match staleness {
                Staleness::UpToDate => println!("{}: up to date", m.key()),
                Staleness::Stale(reason) => println!("{}: stale ({reason})", m.key()),
            }
        }
    }

    debug!("plan complete (no execution)");
    Ok(())
}

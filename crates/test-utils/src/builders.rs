#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use filedag::config::Params;
use filedag::dag::Scheduler;
use filedag::engine::{CoreRuntime, Planner, PlannerOptions, RunReport, Runtime, RuntimeEvent};
use filedag::fs::mock::MockFileSystem;
use filedag::fs::Workspace;
use filedag::pipeline::Pipeline;
use filedag::rules::{Registry, TaskDecl};
use filedag::staleness::{MtimeCheck, StalenessCheck};

use crate::fake_executor::{ExecutionLog, FakeExecutor, Scripted};

/// Assemble a pipeline from declarations, panicking on configuration errors.
pub fn pipeline(decls: Vec<TaskDecl>, params: Params) -> Arc<Pipeline> {
    let mut registry = Registry::new();
    for decl in decls {
        registry.declare(decl).expect("duplicate task in test pipeline");
    }
    Arc::new(Pipeline::assemble(registry, params).expect("test pipeline should assemble"))
}

/// Build a `Params` mapping from string pairs.
pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().copied().collect()
}

/// A workspace over `fs`, rooted at the mock's root.
pub fn mock_workspace(fs: &MockFileSystem) -> Workspace {
    Workspace::new(Arc::new(fs.clone()), PathBuf::new())
}

/// Runs a pipeline against a `MockFileSystem` with a [`FakeExecutor`].
///
/// Successful jobs write their outputs into the mock, so running the same
/// `FakeRun` configuration twice shows what a second real run would do.
pub struct FakeRun {
    pipeline: Arc<Pipeline>,
    fs: MockFileSystem,
    check: Arc<dyn StalenessCheck>,
    outcomes: Vec<(String, Scripted)>,
    write_outputs: bool,
}

impl FakeRun {
    pub fn new(pipeline: Arc<Pipeline>, fs: MockFileSystem) -> Self {
        Self {
            pipeline,
            fs,
            check: Arc::new(MtimeCheck),
            outcomes: Vec::new(),
            write_outputs: true,
        }
    }

    pub fn check(mut self, check: Arc<dyn StalenessCheck>) -> Self {
        self.check = check;
        self
    }

    pub fn outcome(mut self, key: &str, outcome: Scripted) -> Self {
        self.outcomes.push((key.to_string(), outcome));
        self
    }

    /// Successful jobs leave the filesystem untouched.
    pub fn without_outputs(mut self) -> Self {
        self.write_outputs = false;
        self
    }

    /// Start the runtime in the background.
    pub fn start(&self, targets: &[&str]) -> RunningFake {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(1024);

        let mut executor = FakeExecutor::new(tx.clone());
        if self.write_outputs {
            executor = executor.with_filesystem(self.fs.clone());
        }
        for (key, outcome) in &self.outcomes {
            executor = executor.outcome(key, *outcome);
        }
        let log = executor.log();

        let planner = Planner::new(
            Arc::clone(&self.pipeline),
            mock_workspace(&self.fs),
            Arc::clone(&self.check),
            PlannerOptions::default(),
        );
        let core = CoreRuntime::new(Scheduler::new(self.pipeline.graph().clone()));
        let runtime = Runtime::new(core, planner, rx, executor);
        let targets = targets.iter().map(|t| t.to_string()).collect();

        let handle = tokio::spawn(async move { runtime.run(targets).await.expect("runtime failed") });
        RunningFake { tx, handle, log }
    }

    /// Run to completion.
    pub async fn run(&self, targets: &[&str]) -> (RunReport, ExecutionLog) {
        let running = self.start(targets);
        let log = running.log.clone();
        (running.finish().await, log)
    }
}

/// A `FakeRun` in progress.
pub struct RunningFake {
    tx: mpsc::Sender<RuntimeEvent>,
    handle: JoinHandle<RunReport>,
    pub log: ExecutionLog,
}

impl RunningFake {
    /// Wait until the executor received at least `n` jobs.
    pub async fn wait_for_dispatches(&self, n: usize) {
        crate::with_timeout(async {
            while self.log.len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }

    /// Ask the runtime to abort, as Ctrl-C does.
    pub async fn abort(&self) {
        self.tx
            .send(RuntimeEvent::ShutdownRequested)
            .await
            .expect("runtime gone");
    }

    pub async fn finish(self) -> RunReport {
        crate::with_timeout(self.handle).await.expect("runtime task panicked")
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use filedag::engine::{FailureReason, MatchOutcome, RuntimeEvent};
use filedag::errors::Result;
use filedag::exec::{ExecutorBackend, Job};
use filedag::fs::mock::MockFileSystem;
use filedag::rules::MatchKey;

/// What the fake does with a dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// Report success (and write the outputs if a filesystem is attached).
    Succeed,
    /// Report a non-zero exit; writes nothing.
    Fail(i32),
    /// Report nothing until `cancel_all`, then report `Cancelled`.
    Hang,
}

/// Every job the fake executor received, in dispatch order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<Job>>>);

impl ExecutionLog {
    pub fn jobs(&self) -> Vec<Job> {
        self.0.lock().unwrap().clone()
    }

    /// `task[id]` of every received job.
    pub fn keys(&self) -> Vec<String> {
        self.jobs().iter().map(|j| j.key.to_string()).collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.jobs().into_iter().map(|j| j.invocation.command).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, job: Job) {
        self.0.lock().unwrap().push(job);
    }
}

/// A fake executor that:
/// - records which jobs were "run"
/// - reports a scripted outcome for each (success by default)
/// - optionally writes the outputs of successful jobs into a `MockFileSystem`,
///   so staleness of later runs can be observed.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: ExecutionLog,
    outcomes: HashMap<String, Scripted>,
    fs: Option<MockFileSystem>,
    hung: Arc<Mutex<Vec<MatchKey>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            log: ExecutionLog::default(),
            outcomes: HashMap::new(),
            fs: None,
            hung: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_filesystem(mut self, fs: MockFileSystem) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Script the outcome for a whole task (`"align"`) or a single Match
    /// (`"align[in/s1.fq]"`); the Match form wins.
    pub fn outcome(mut self, key: &str, outcome: Scripted) -> Self {
        self.outcomes.insert(key.to_string(), outcome);
        self
    }

    pub fn log(&self) -> ExecutionLog {
        self.log.clone()
    }

    fn scripted(&self, key: &MatchKey) -> Scripted {
        self.outcomes
            .get(&key.to_string())
            .or_else(|| self.outcomes.get(&key.task))
            .copied()
            .unwrap_or(Scripted::Succeed)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(&mut self, jobs: Vec<Job>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let planned: Vec<(Job, Scripted)> = jobs
            .into_iter()
            .map(|job| {
                let scripted = self.scripted(&job.key);
                (job, scripted)
            })
            .collect();
        let log = self.log.clone();
        let fs = self.fs.clone();
        let hung = Arc::clone(&self.hung);

        Box::pin(async move {
            for (job, scripted) in planned {
                log.push(job.clone());
                let outcome = match scripted {
                    Scripted::Succeed => {
                        if let Some(fs) = &fs {
                            for out in &job.m.outputs {
                                fs.add_file(out, format!("output of {}", job.key));
                            }
                        }
                        MatchOutcome::Succeeded {
                            duration: Duration::from_millis(1),
                        }
                    }
                    Scripted::Fail(code) => MatchOutcome::Failed {
                        reason: FailureReason::Exit(code),
                        duration: Duration::from_millis(1),
                    },
                    Scripted::Hang => {
                        hung.lock().unwrap().push(job.key.clone());
                        continue;
                    }
                };
                tx.send(RuntimeEvent::MatchCompleted {
                    key: job.key.clone(),
                    outcome,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let keys: Vec<MatchKey> = self.hung.lock().unwrap().drain(..).collect();

        Box::pin(async move {
            for key in keys {
                tx.send(RuntimeEvent::MatchCompleted {
                    key,
                    outcome: MatchOutcome::Failed {
                        reason: FailureReason::Cancelled,
                        duration: Duration::from_millis(1),
                    },
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}

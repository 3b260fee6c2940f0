// src/exec/executor_loop.rs

//! Main executor loop that manages running job processes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, info};

use crate::engine::RuntimeEvent;
use crate::exec::job::Job;
use crate::exec::task_runner::run_job;
use crate::fs::Workspace;
use crate::rules::MatchKey;

/// Messages accepted by the executor loop.
#[derive(Debug)]
pub enum ExecutorMessage {
    Run(Job),
    /// Stop every queued or running job.
    CancelAll,
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Worker slots shared by all jobs; a job occupies `threads` of them.
    pub jobs: usize,
    pub workspace: Workspace,
}

/// Shared state handed to every job runner.
#[derive(Debug, Clone)]
pub(crate) struct RunnerContext {
    pub slots: Arc<Semaphore>,
    pub total_slots: u32,
    pub workspace: Workspace,
}

/// Internal handle for a queued or running job.
struct ActiveJob {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Every job runs in its own Tokio task and waits for worker slots on a
/// shared semaphore, so at most `jobs` slots are in use at any time.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    settings: ExecutorSettings,
) -> mpsc::Sender<ExecutorMessage> {
    let (tx, mut rx) = mpsc::channel::<ExecutorMessage>(64);
    let total_slots = u32::try_from(settings.jobs.max(1)).unwrap_or(u32::MAX);
    let ctx = RunnerContext {
        slots: Arc::new(Semaphore::new(total_slots as usize)),
        total_slots,
        workspace: settings.workspace,
    };

    tokio::spawn(async move {
        info!(jobs = total_slots, "executor loop started");

        let mut active: HashMap<MatchKey, ActiveJob> = HashMap::new();

        while let Some(msg) = rx.recv().await {
            active.retain(|_, job| !job.handle.is_finished());
            match msg {
                ExecutorMessage::Run(job) => start_job(job, &ctx, &mut active, &runtime_tx),
                ExecutorMessage::CancelAll => cancel_all(&mut active),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn start_job(
    job: Job,
    ctx: &RunnerContext,
    active: &mut HashMap<MatchKey, ActiveJob>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let key = job.key.clone();
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let ctx = ctx.clone();
    let spawn_key = key.clone();

    let handle = tokio::spawn(async move {
        run_job(job, ctx, rt_tx, cancel_rx).await;
        debug!(job = %spawn_key, "job runner future finished");
    });

    active.insert(
        key,
        ActiveJob {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn cancel_all(active: &mut HashMap<MatchKey, ActiveJob>) {
    info!(jobs = active.len(), "cancelling all queued and running jobs");
    for (key, job) in active.iter_mut() {
        if let Some(cancel) = job.cancel.take() {
            if cancel.send(()).is_err() {
                debug!(job = %key, "job already finished while cancelling");
            }
        }
    }
}

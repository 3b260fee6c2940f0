// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender,
//! so tests can swap in a fake executor while production uses
//! [`RealExecutorBackend`], which forwards jobs to the executor loop in
//! [`executor_loop`](super::executor_loop).

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};
use crate::exec::executor_loop::{spawn_executor, ExecutorMessage, ExecutorSettings};
use crate::exec::job::Job;

/// How stale Matches get executed.
///
/// Implementations report every dispatched job back as exactly one
/// `RuntimeEvent::MatchCompleted`.
pub trait ExecutorBackend: Send {
    fn dispatch(&mut self, jobs: Vec<Job>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Stop everything in flight: queued jobs complete as not started,
    /// running processes are terminated.
    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorMessage>,
}

impl RealExecutorBackend {
    /// Spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, settings: ExecutorSettings) -> Self {
        let tx = spawn_executor(runtime_tx, settings);
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn dispatch(&mut self, jobs: Vec<Job>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(ExecutorMessage::Run(job))
                    .await
                    .map_err(Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            tx.send(ExecutorMessage::CancelAll)
                .await
                .map_err(Error::from)?;
            Ok(())
        })
    }
}

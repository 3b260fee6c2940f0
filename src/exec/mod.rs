// src/exec/mod.rs

//! Process execution layer.
//!
//! Runs the commands of stale Matches with `tokio::process::Command` and
//! reports back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`job`] holds what the executor receives for one Match.
//! - [`executor_loop`] owns the loop that starts and cancels jobs and the
//!   worker-slot semaphore.
//! - [`task_runner`] runs one process and checks its outputs.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod job;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::{spawn_executor, ExecutorMessage, ExecutorSettings};
pub use job::{Invocation, Job};

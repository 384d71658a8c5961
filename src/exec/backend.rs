// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The scheduler hands each job to a `WorkerBackend` instead of spawning
//! processes itself. Production uses [`ProcessBackend`](super::ProcessBackend),
//! which runs every job in a fresh OS process; tests can run plans
//! in-process or simulate outcomes without touching the OS.

use std::future::Future;
use std::pin::Pin;

use crate::bus::Publisher;
use crate::errors::Error;

use super::protocol::WorkerJob;
use super::worker::WorkerReport;

/// Trait abstracting how one job's tasks are executed.
pub trait WorkerBackend: Send + Sync {
    /// Run every task of `job`, publishing its progress events through
    /// `publisher` in emission order, and report how the job ended.
    ///
    /// An `Err` means the worker itself could not be driven (spawn failure,
    /// broken pipe); the scheduler treats it as an execution error.
    fn run_job(
        &self,
        job: WorkerJob,
        publisher: Publisher,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerReport, Error>> + Send + '_>>;
}

// src/exec/mod.rs

//! Execution layer.
//!
//! Everything that runs a job's tasks lives here, on both sides of the
//! process boundary:
//!
//! - [`protocol`] defines the job payload a worker receives.
//! - [`worker`] runs that payload task by task and emits progress events
//!   (the `worker` subcommand is a thin wrapper around it).
//! - [`command`] runs `Shell`/`Exec` work as blocking child processes.
//! - [`stage`] and [`builtin`] provide in-process stages.
//! - [`backend`] is the seam the scheduler talks to; [`process`] is the
//!   production implementation that spawns one worker process per job.

pub mod backend;
pub mod builtin;
mod command;
pub mod process;
pub mod protocol;
pub mod stage;
pub mod worker;

pub use backend::WorkerBackend;
pub use process::{ProcessBackend, WORKER_SUBCOMMAND};
pub use protocol::{TaskSpec, WorkerJob};
pub use stage::{Stage, StageContext, StageError, StageRegistry};
pub use worker::{EventSink, JsonLines, WorkerReport, execute_plan, run_worker};

// src/exec/process.rs

//! Production backend: one OS worker process per job.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

use crate::bus::{EventKind, ProgressEvent, Publisher};
use crate::engine::JobOutcome;
use crate::errors::Error;
use crate::logging::LOG_ENV;

use super::backend::WorkerBackend;
use super::protocol::WorkerJob;
use super::worker::WorkerReport;

/// Subcommand the binary uses for the worker entry point.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Launches `program args...`, writes the job to its stdin, relays each
/// stdout line to the bus and maps the exit status to the outcome.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessBackend {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-run the current executable as `<exe> worker`.
    pub fn current_exe() -> anyhow::Result<Self> {
        let exe = std::env::current_exe().context("locating current executable")?;
        Ok(Self::new(exe, vec![WORKER_SUBCOMMAND.to_string()]))
    }

    async fn drive(&self, job: WorkerJob, publisher: Publisher) -> anyhow::Result<WorkerReport> {
        let payload = serde_json::to_vec(&job).context("encoding worker job")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(LOG_ENV, LevelFilter::current().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning worker {:?} for job '{}'", self.program, job.job_id))?;
        let pid = child.id();
        info!(job = %job.job_id, pid, tasks = job.tasks.len(), "worker process started");

        let mut stdin = child.stdin.take().context("worker stdin not captured")?;
        let stdout = child.stdout.take().context("worker stdout not captured")?;

        // Always consume stderr so buffers don't fill; log at debug.
        let stderr_relay = child.stderr.take().map(|stderr| {
            let job_id = job.job_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(job = %job_id, pid, "worker stderr: {}", line);
                }
            })
        });

        stdin
            .write_all(&payload)
            .await
            .with_context(|| format!("sending job '{}' to worker", job.job_id))?;
        stdin.shutdown().await.ok();
        drop(stdin);

        let mut executed = Vec::new();
        let mut message = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("reading events of job '{}'", job.job_id))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let event: ProgressEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(job = %job.job_id, error = %e, "ignoring malformed worker output");
                    continue;
                }
            };

            match event.kind {
                EventKind::Started => executed.extend(event.task_id.clone()),
                EventKind::Failed | EventKind::Fatal => {
                    message = match (&event.task_id, &event.payload) {
                        (Some(task), Some(msg)) => Some(format!("task '{task}' {msg}")),
                        (_, payload) => payload.clone(),
                    };
                }
                EventKind::Step | EventKind::Succeeded => {}
            }
            publisher.publish(event);
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for worker of job '{}'", job.job_id))?;
        if let Some(relay) = stderr_relay {
            // Ends at EOF, which the exited worker has already sent.
            if let Err(e) = relay.await {
                warn!(job = %job.job_id, error = %e, "worker stderr relay failed");
            }
        }

        let outcome = match status.code().and_then(JobOutcome::from_worker_code) {
            Some(outcome) => outcome,
            None => {
                message = Some(format!("worker process {status}"));
                JobOutcome::ExecutionError
            }
        };
        info!(job = %job.job_id, pid, %status, ?outcome, "worker process exited");

        Ok(WorkerReport {
            outcome,
            executed,
            message,
        })
    }
}

impl WorkerBackend for ProcessBackend {
    fn run_job(
        &self,
        job: WorkerJob,
        publisher: Publisher,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerReport, Error>> + Send + '_>> {
        Box::pin(self.drive(job, publisher))
    }
}

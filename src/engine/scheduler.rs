// src/engine/scheduler.rs

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::pool::WorkerPool;
use super::{JobOutcome, JobResult, JobState};
use crate::bus::{ProgressEvent, Publisher};
use crate::dag::{GraphError, Target, TaskGraph, plan};
use crate::exec::{WorkerBackend, WorkerJob};
use crate::fs::FileSystem;
use crate::types::{JobId, TaskId};

/// Why a submission was rejected before dispatch. Always maps to
/// [`JobOutcome::PreExecutionError`].
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("job '{0}' is already queued or running")]
    AlreadyRunning(JobId),

    #[error("scheduler is shut down")]
    ShutDown,
}

impl SubmitError {
    pub fn outcome(&self) -> JobOutcome {
        JobOutcome::PreExecutionError
    }
}

type JobTable = Arc<Mutex<HashMap<JobId, JobState>>>;

fn lock(jobs: &JobTable) -> MutexGuard<'_, HashMap<JobId, JobState>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Accepts jobs, filters them against the file system and runs each in one
/// worker from a bounded pool.
///
/// At most one execution per job id is active at any time. Every accepted
/// job publishes exactly one terminal job event, after all of its task
/// events.
pub struct Scheduler {
    pool: WorkerPool,
    backend: Arc<dyn WorkerBackend>,
    publisher: Publisher,
    fs: Arc<dyn FileSystem>,
    jobs: JobTable,
    closed: AtomicBool,
}

impl Scheduler {
    pub fn new(
        pool: WorkerPool,
        backend: Arc<dyn WorkerBackend>,
        publisher: Publisher,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            pool,
            backend,
            publisher,
            fs,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn state_of(&self, job_id: &JobId) -> Option<JobState> {
        lock(&self.jobs).get(job_id).copied()
    }

    /// Plan `targets` of `graph` and dispatch the tasks that need to run.
    ///
    /// Waits only for a free worker slot. Graph errors and duplicate job
    /// ids are rejected without consuming a slot; a plan with nothing to do
    /// completes immediately without starting a worker.
    pub async fn submit(
        &self,
        graph: &TaskGraph,
        targets: &[Target],
        job_id: JobId,
    ) -> Result<JobHandle, SubmitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.reject(&job_id, SubmitError::ShutDown));
        }

        let plan = plan(graph, targets, self.fs.as_ref())
            .map_err(|e| self.reject(&job_id, e.into()))?;

        let mut reservation = Reservation::new(&self.jobs, &job_id)?;
        let skipped: Vec<TaskId> = plan.skipped().cloned().collect();
        let (tx, rx) = oneshot::channel();
        let handle = JobHandle {
            job_id: job_id.clone(),
            result: rx,
        };

        if plan.is_empty() {
            info!(job = %job_id, skipped = skipped.len(), "all tasks up to date; nothing to run");
            reservation.release();
            let result = JobResult {
                job_id,
                outcome: JobOutcome::AllSucceeded,
                executed: Vec::new(),
                skipped,
                message: None,
            };
            finish(&self.jobs, &self.publisher, result, tx);
            return Ok(handle);
        }

        let permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Err(self.reject(&job_id, SubmitError::ShutDown)),
        };
        reservation.release();
        lock(&self.jobs).insert(job_id.clone(), JobState::Running);

        let worker_job = WorkerJob::from_plan(job_id.clone(), &plan);
        info!(
            job = %job_id,
            tasks = worker_job.tasks.len(),
            skipped = skipped.len(),
            "dispatching job to worker"
        );

        let backend = Arc::clone(&self.backend);
        let publisher = self.publisher.clone();
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            let run = backend.run_job(worker_job, publisher.clone());
            let (outcome, executed, message) = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(report)) => (report.outcome, report.executed, report.message),
                Ok(Err(e)) => {
                    error!(job = %job_id, error = %e, "worker backend failed");
                    (JobOutcome::ExecutionError, Vec::new(), Some(format!("{e:#}")))
                }
                Err(_) => {
                    error!(job = %job_id, "worker backend panicked");
                    (
                        JobOutcome::ExecutionError,
                        Vec::new(),
                        Some("worker backend panicked".to_string()),
                    )
                }
            };

            let result = JobResult {
                job_id,
                outcome,
                executed,
                skipped,
                message,
            };
            finish(&jobs, &publisher, result, tx);
            drop(permit);
        });

        Ok(handle)
    }

    /// Submit and wait; rejections become a `PreExecutionError` result.
    pub async fn run(&self, graph: &TaskGraph, targets: &[Target], job_id: JobId) -> JobResult {
        match self.submit(graph, targets, job_id.clone()).await {
            Ok(handle) => handle.wait().await,
            Err(e) => JobResult::rejected(job_id, e.to_string()),
        }
    }

    /// Refuse new submissions and wait for every dispatched job to finish.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.pool.close_and_drain().await;
        info!("scheduler shut down");
    }

    fn reject(&self, job_id: &JobId, err: SubmitError) -> SubmitError {
        warn!(job = %job_id, error = %err, "job rejected before execution");
        if !matches!(err, SubmitError::AlreadyRunning(_)) {
            self.publisher
                .publish(ProgressEvent::fatal(job_id, None, err.to_string()));
        }
        err
    }
}

/// Record the terminal state, publish the job event, then hand the result
/// to the submitter.
fn finish(
    jobs: &JobTable,
    publisher: &Publisher,
    result: JobResult,
    tx: oneshot::Sender<JobResult>,
) {
    lock(jobs).insert(result.job_id.clone(), JobState::terminal(result.outcome));

    let job_id = &result.job_id;
    let message = result.message.clone();
    let event = match result.outcome {
        JobOutcome::AllSucceeded => ProgressEvent::succeeded(job_id, None),
        JobOutcome::TaskFailed => {
            ProgressEvent::failed(job_id, None, message.unwrap_or_else(|| "task failed".into()))
        }
        JobOutcome::ExecutionError | JobOutcome::PreExecutionError => ProgressEvent::fatal(
            job_id,
            None,
            message.unwrap_or_else(|| "execution error".into()),
        ),
    };
    publisher.publish(event);

    info!(
        job = %result.job_id,
        outcome = ?result.outcome,
        code = result.code(),
        executed = result.executed.len(),
        skipped = result.skipped.len(),
        "job finished"
    );
    // The submitter may have dropped its handle.
    let _ = tx.send(result);
}

/// Marks a job id as queued; removes the mark again if the submission is
/// abandoned before dispatch.
struct Reservation<'a> {
    jobs: &'a JobTable,
    job_id: JobId,
    armed: bool,
}

impl<'a> Reservation<'a> {
    fn new(jobs: &'a JobTable, job_id: &JobId) -> Result<Self, SubmitError> {
        let mut table = lock(jobs);
        if table.get(job_id).is_some_and(|s| s.is_active()) {
            warn!(job = %job_id, "job is already queued or running");
            return Err(SubmitError::AlreadyRunning(job_id.clone()));
        }
        table.insert(job_id.clone(), JobState::Queued);
        Ok(Self {
            jobs,
            job_id: job_id.clone(),
            armed: true,
        })
    }

    fn release(&mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.jobs).remove(&self.job_id);
        }
    }
}

/// Handle to an accepted job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    result: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn wait(self) -> JobResult {
        match self.result.await {
            Ok(result) => result,
            Err(_) => JobResult {
                job_id: self.job_id,
                outcome: JobOutcome::ExecutionError,
                executed: Vec::new(),
                skipped: Vec::new(),
                message: Some("job ended without reporting a result".to_string()),
            },
        }
    }
}

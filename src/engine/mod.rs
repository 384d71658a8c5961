// src/engine/mod.rs

//! Job orchestration.
//!
//! - [`scheduler`] accepts job submissions, plans them against the current
//!   file state and dispatches each to a worker backend.
//! - [`pool`] bounds how many workers run at once.
//! - [`services`] wires the scheduler and the event bus together with an
//!   explicit start/shutdown lifecycle.

pub mod pool;
pub mod scheduler;
pub mod services;

use crate::types::{JobId, TaskId};

pub use pool::WorkerPool;
pub use scheduler::{JobHandle, Scheduler, SubmitError};
pub use services::{ServiceOptions, Services};

/// Terminal result of a job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOutcome {
    AllSucceeded,
    /// A task reported a typed failure; later tasks did not run.
    TaskFailed,
    /// A task or the worker crashed.
    ExecutionError,
    /// Rejected before any work was dispatched.
    PreExecutionError,
}

impl JobOutcome {
    /// Stable result code; also the worker's and the CLI's exit status.
    pub fn code(self) -> i32 {
        match self {
            JobOutcome::AllSucceeded => 0,
            JobOutcome::TaskFailed => 1,
            JobOutcome::ExecutionError => 2,
            JobOutcome::PreExecutionError => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(JobOutcome::AllSucceeded),
            1 => Some(JobOutcome::TaskFailed),
            2 => Some(JobOutcome::ExecutionError),
            3 => Some(JobOutcome::PreExecutionError),
            _ => None,
        }
    }

    /// Exit codes a worker process may legitimately use.
    pub fn from_worker_code(code: i32) -> Option<Self> {
        Self::from_code(code).filter(|o| *o != JobOutcome::PreExecutionError)
    }

    pub fn is_success(self) -> bool {
        self == JobOutcome::AllSucceeded
    }
}

/// Lifecycle of a submitted job. There is no cancelled state: once
/// dispatched, a job runs to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    TaskFailed,
    ExecutionError,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }

    fn terminal(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::AllSucceeded => JobState::Succeeded,
            JobOutcome::TaskFailed => JobState::TaskFailed,
            JobOutcome::ExecutionError | JobOutcome::PreExecutionError => {
                JobState::ExecutionError
            }
        }
    }
}

/// Reported exactly once per submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: JobId,
    pub outcome: JobOutcome,
    /// Tasks that were started, in execution order.
    pub executed: Vec<TaskId>,
    /// Tasks selected for the job but found up to date.
    pub skipped: Vec<TaskId>,
    pub message: Option<String>,
}

impl JobResult {
    pub fn code(&self) -> i32 {
        self.outcome.code()
    }

    pub(crate) fn rejected(job_id: JobId, message: String) -> Self {
        Self {
            job_id,
            outcome: JobOutcome::PreExecutionError,
            executed: Vec::new(),
            skipped: Vec::new(),
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_are_stable() {
        let all = [
            JobOutcome::AllSucceeded,
            JobOutcome::TaskFailed,
            JobOutcome::ExecutionError,
            JobOutcome::PreExecutionError,
        ];
        let codes: Vec<i32> = all.iter().map(|o| o.code()).collect();
        assert_eq!(codes, [0, 1, 2, 3]);
        for outcome in all {
            assert_eq!(JobOutcome::from_code(outcome.code()), Some(outcome));
        }
    }

    #[test]
    fn workers_cannot_claim_pre_execution_errors() {
        assert_eq!(JobOutcome::from_worker_code(3), None);
        assert_eq!(JobOutcome::from_worker_code(137), None);
        assert_eq!(JobOutcome::from_worker_code(1), Some(JobOutcome::TaskFailed));
    }
}

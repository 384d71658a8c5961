// src/exec/protocol.rs

//! What crosses the parent/worker process boundary.
//!
//! The parent writes one [`WorkerJob`] as JSON to the worker's stdin and
//! closes it. The worker answers with one
//! [`ProgressEvent`](crate::bus::ProgressEvent) JSON object per stdout line
//! and exits with [`JobOutcome::code`](crate::engine::JobOutcome::code).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dag::ExecutionPlan;
use crate::task::{Task, Work};
use crate::types::{JobId, TaskId};

/// A task as shipped to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    #[serde(default)]
    pub consumes: Vec<PathBuf>,
    #[serde(default)]
    pub produces: Vec<PathBuf>,
    /// `None` for task groups.
    #[serde(default)]
    pub work: Option<Work>,
    #[serde(default)]
    pub step_pattern: Option<String>,
}

impl From<&Task> for TaskSpec {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id().clone(),
            consumes: task.consumes().to_vec(),
            produces: task.produces().to_vec(),
            work: task.work().cloned(),
            step_pattern: task.step_pattern().map(|re| re.as_str().to_string()),
        }
    }
}

/// The ordered tasks one worker runs for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub job_id: JobId,
    pub tasks: Vec<TaskSpec>,
}

impl WorkerJob {
    /// Only the tasks the plan decided to run, in plan order.
    pub fn from_plan(job_id: JobId, plan: &ExecutionPlan) -> Self {
        Self {
            job_id,
            tasks: plan.to_run().map(TaskSpec::from).collect(),
        }
    }
}

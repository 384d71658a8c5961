// src/bus/event.rs

//! Progress events and their wire representation.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, TaskId};

/// Task name reported for job-level events on the wire.
pub const JOB_TASK_NAME: &str = "processing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Step,
    Succeeded,
    /// Typed failure of a task.
    Failed,
    /// Crash, or a job rejected before execution.
    Fatal,
}

/// One lifecycle event of a job. `task_id == None` marks a job-level event.
///
/// This is also the line format a worker process writes to its stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl ProgressEvent {
    fn new(kind: EventKind, job_id: &JobId, task_id: Option<&TaskId>) -> Self {
        Self {
            kind,
            job_id: job_id.clone(),
            task_id: task_id.cloned(),
            payload: None,
        }
    }

    pub fn started(job_id: &JobId, task_id: &TaskId) -> Self {
        Self::new(EventKind::Started, job_id, Some(task_id))
    }

    pub fn step(job_id: &JobId, task_id: &TaskId, message: impl Into<String>) -> Self {
        Self::new(EventKind::Step, job_id, Some(task_id)).with_payload(message)
    }

    pub fn succeeded(job_id: &JobId, task_id: Option<&TaskId>) -> Self {
        Self::new(EventKind::Succeeded, job_id, task_id)
    }

    pub fn failed(job_id: &JobId, task_id: Option<&TaskId>, message: impl Into<String>) -> Self {
        Self::new(EventKind::Failed, job_id, task_id).with_payload(message)
    }

    pub fn fatal(job_id: &JobId, task_id: Option<&TaskId>, message: impl Into<String>) -> Self {
        Self::new(EventKind::Fatal, job_id, task_id).with_payload(message)
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// The job-level outcome event: emitted exactly once per submission,
    /// after every task event of that job.
    pub fn is_terminal(&self) -> bool {
        self.task_id.is_none()
            && matches!(
                self.kind,
                EventKind::Succeeded | EventKind::Failed | EventKind::Fatal
            )
    }

    pub fn to_wire(&self) -> WireEvent {
        let event = match self.kind {
            EventKind::Started => WireKind::Start,
            EventKind::Step => WireKind::Step,
            EventKind::Succeeded => WireKind::Success,
            EventKind::Failed | EventKind::Fatal => WireKind::Error,
        };
        WireEvent {
            event,
            task: self
                .task_id
                .as_ref()
                .map_or_else(|| JOB_TASK_NAME.to_string(), ToString::to_string),
            song_id: self.job_id.to_string(),
            message: self.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    Start,
    Step,
    Success,
    Error,
}

/// JSON shape pushed to live listeners:
/// `{"event":"start","task":"separate_audio","songId":"42"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: WireKind,
    pub task: String,
    #[serde(rename = "songId")]
    pub song_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

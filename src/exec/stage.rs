// src/exec/stage.rs

//! In-process stages.
//!
//! A [`Stage`] is a blocking unit of work registered by name in a
//! [`StageRegistry`]. It sees the task's resolved file lists through a
//! [`StageContext`], may report progress with [`StageContext::step`], and
//! signals a typed failure with [`StageError`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::types::TaskId;

/// Typed failure of a stage body; maps to a failed task.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StageError {
    pub fn failed(msg: impl Into<String>) -> Self {
        StageError::Failed(msg.into())
    }
}

/// Sink for progress messages; returns an error when the event channel is
/// gone.
pub type StepReporter<'a> = dyn FnMut(&str) -> io::Result<()> + 'a;

pub struct StageContext<'a> {
    task_id: &'a TaskId,
    consumes: &'a [PathBuf],
    produces: &'a [PathBuf],
    reporter: &'a mut StepReporter<'a>,
    report_error: Option<io::Error>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        task_id: &'a TaskId,
        consumes: &'a [PathBuf],
        produces: &'a [PathBuf],
        reporter: &'a mut StepReporter<'a>,
    ) -> Self {
        Self {
            task_id,
            consumes,
            produces,
            reporter,
            report_error: None,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        self.task_id
    }

    pub fn consumes(&self) -> &[PathBuf] {
        self.consumes
    }

    pub fn produces(&self) -> &[PathBuf] {
        self.produces
    }

    pub fn input(&self, idx: usize) -> Result<&Path, StageError> {
        self.consumes
            .get(idx)
            .map(PathBuf::as_path)
            .ok_or_else(|| StageError::failed(format!("stage expects at least {} input(s)", idx + 1)))
    }

    pub fn output(&self, idx: usize) -> Result<&Path, StageError> {
        self.produces
            .get(idx)
            .map(PathBuf::as_path)
            .ok_or_else(|| StageError::failed(format!("stage expects at least {} output(s)", idx + 1)))
    }

    /// Report progress. After the first delivery error further reports are
    /// ignored and the task is treated as crashed once the stage returns.
    pub fn step(&mut self, message: impl AsRef<str>) {
        if self.report_error.is_none() {
            if let Err(e) = (self.reporter)(message.as_ref()) {
                self.report_error = Some(e);
            }
        }
    }

    pub(crate) fn take_report_error(&mut self) -> Option<io::Error> {
        self.report_error.take()
    }
}

pub trait Stage: Send + Sync {
    fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError>;
}

impl<F> Stage for F
where
    F: Fn(&mut StageContext<'_>) -> Result<(), StageError> + Send + Sync,
{
    fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        self(ctx)
    }
}

/// Named stages available to a worker.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `copy` and `combine_lexicons`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("copy", super::builtin::copy);
        registry.register("combine_lexicons", super::builtin::combine_lexicons);
        registry
    }

    pub fn register<S>(&mut self, name: impl Into<String>, stage: S) -> &mut Self
    where
        S: Stage + 'static,
    {
        self.stages.insert(name.into(), Arc::new(stage));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.stages.keys()).finish()
    }
}

// src/task/mod.rs

//! Task declarations.
//!
//! A [`Task`] is an immutable description of one stage: which files it
//! reads, which files it writes, what extra tasks it waits for, and the unit
//! of [`Work`] that produces its outputs. Tasks are built and validated
//! through [`TaskBuilder`]; task families come from [`expand_family`].

pub mod builder;
pub mod family;
pub mod work;

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::types::TaskId;

pub use builder::TaskBuilder;
pub use family::expand_family;
pub use work::Work;

/// Validation failures raised while building a [`Task`].
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task id must not be empty")]
    EmptyId,

    #[error("task '{0}' has work but produces no files")]
    NoOutputs(TaskId),

    #[error("task '{task}' lists {path:?} twice in {list}")]
    DuplicatePath {
        task: TaskId,
        list: &'static str,
        path: PathBuf,
    },

    #[error("task group '{0}' must not consume or produce files")]
    InvalidGroup(TaskId),

    #[error("task '{task}' has an invalid step_pattern: {source}")]
    InvalidPattern {
        task: TaskId,
        #[source]
        source: regex::Error,
    },
}

/// One stage of a pipeline.
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) consumes: Vec<PathBuf>,
    pub(crate) produces: Vec<PathBuf>,
    pub(crate) after: Vec<TaskId>,
    pub(crate) work: Option<Work>,
    pub(crate) always_fresh: bool,
    pub(crate) step_pattern: Option<Regex>,
}

impl Task {
    pub fn builder(id: impl Into<TaskId>) -> TaskBuilder {
        TaskBuilder::new(id)
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn consumes(&self) -> &[PathBuf] {
        &self.consumes
    }

    pub fn produces(&self) -> &[PathBuf] {
        &self.produces
    }

    /// Explicit task dependencies, in addition to those implied by files.
    pub fn after(&self) -> &[TaskId] {
        &self.after
    }

    pub fn work(&self) -> Option<&Work> {
        self.work.as_ref()
    }

    pub fn always_fresh(&self) -> bool {
        self.always_fresh
    }

    pub fn step_pattern(&self) -> Option<&Regex> {
        self.step_pattern.as_ref()
    }

    /// A group only names other tasks; it has no work and no files.
    pub fn is_group(&self) -> bool {
        self.work.is_none()
    }

    pub fn produces_path(&self, path: &Path) -> bool {
        self.produces.iter().any(|p| p == path)
    }
}

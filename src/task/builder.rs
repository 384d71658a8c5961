// src/task/builder.rs

use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;

use super::{Task, TaskError, Work};
use crate::types::TaskId;

/// Fluent constructor for [`Task`]; all validation happens in [`build`].
///
/// ```
/// use pipedag::task::TaskBuilder;
///
/// let task = TaskBuilder::new("find_silences")
///     .consumes("out/vocals.wav")
///     .produces("out/silences.json")
///     .shell("detect-silence {consumes} > {produces}")
///     .build()
///     .unwrap();
/// assert_eq!(task.id().as_str(), "find_silences");
/// ```
///
/// [`build`]: TaskBuilder::build
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    id: TaskId,
    consumes: Vec<PathBuf>,
    produces: Vec<PathBuf>,
    after: Vec<TaskId>,
    work: Option<Work>,
    always_fresh: bool,
    step_pattern: Option<String>,
}

impl TaskBuilder {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            consumes: Vec::new(),
            produces: Vec::new(),
            after: Vec::new(),
            work: None,
            always_fresh: false,
            step_pattern: None,
        }
    }

    /// Start a task group: no work, no files, only `after` dependencies.
    pub fn group<I, T>(id: impl Into<TaskId>, members: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        let mut builder = Self::new(id);
        builder.after.extend(members.into_iter().map(Into::into));
        builder
    }

    pub fn consumes(mut self, path: impl Into<PathBuf>) -> Self {
        self.consumes.push(path.into());
        self
    }

    pub fn consumes_all<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.consumes.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn produces(mut self, path: impl Into<PathBuf>) -> Self {
        self.produces.push(path.into());
        self
    }

    pub fn produces_all<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.produces.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn after(mut self, dep: impl Into<TaskId>) -> Self {
        self.after.push(dep.into());
        self
    }

    pub fn work(mut self, work: Work) -> Self {
        self.work = Some(work);
        self
    }

    pub fn shell(self, cmd: impl Into<String>) -> Self {
        self.work(Work::Shell(cmd.into()))
    }

    pub fn exec<I, S>(self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.work(Work::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    pub fn stage(self, name: impl Into<String>) -> Self {
        self.work(Work::Stage(name.into()))
    }

    pub fn always_fresh(mut self, val: bool) -> Self {
        self.always_fresh = val;
        self
    }

    pub fn step_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.step_pattern = Some(pattern.into());
        self
    }

    pub fn build(self) -> Result<Task, TaskError> {
        if self.id.is_empty() {
            return Err(TaskError::EmptyId);
        }

        if self.work.is_none() {
            if !self.consumes.is_empty() || !self.produces.is_empty() {
                return Err(TaskError::InvalidGroup(self.id));
            }
        } else if self.produces.is_empty() {
            return Err(TaskError::NoOutputs(self.id));
        }

        for (list, paths) in [("consumes", &self.consumes), ("produces", &self.produces)] {
            let mut seen = HashSet::new();
            if let Some(dup) = paths.iter().find(|p| !seen.insert(*p)) {
                return Err(TaskError::DuplicatePath {
                    task: self.id.clone(),
                    list,
                    path: dup.clone(),
                });
            }
        }

        let step_pattern = match self.step_pattern {
            Some(ref pattern) => Some(Regex::new(pattern).map_err(|source| {
                TaskError::InvalidPattern {
                    task: self.id.clone(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(Task {
            id: self.id,
            consumes: self.consumes,
            produces: self.produces,
            after: self.after,
            work: self.work,
            always_fresh: self.always_fresh,
            step_pattern,
        })
    }
}

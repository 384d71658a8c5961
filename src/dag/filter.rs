// src/dag/filter.rs

//! Up-to-date check for a single task.
//!
//! Purely a function of the current file state: existence and modification
//! time of consumed and produced paths. Nothing is cached between
//! invocations.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::fs::FileSystem;
use crate::task::Task;

/// Why a task is (or is not) current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// All outputs exist and no input is newer than any output.
    UpToDate,
    /// All outputs exist and the task is declared always fresh.
    AlwaysFresh,
    MissingOutput(PathBuf),
    MissingInput(PathBuf),
    /// `input` was modified after `output`.
    StaleInput { input: PathBuf, output: PathBuf },
    /// Nothing is produced, so freshness cannot be decided.
    NoOutputs,
    /// Nothing is consumed and the task is not always fresh.
    NoInputs,
}

impl Freshness {
    pub fn needs_run(&self) -> bool {
        !matches!(self, Freshness::UpToDate | Freshness::AlwaysFresh)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::UpToDate => f.write_str("up to date"),
            Freshness::AlwaysFresh => f.write_str("outputs exist (always fresh)"),
            Freshness::MissingOutput(p) => write!(f, "missing output {}", p.display()),
            Freshness::MissingInput(p) => write!(f, "missing input {}", p.display()),
            Freshness::StaleInput { input, output } => {
                write!(f, "{} is newer than {}", input.display(), output.display())
            }
            Freshness::NoOutputs => f.write_str("produces nothing"),
            Freshness::NoInputs => f.write_str("consumes nothing"),
        }
    }
}

/// Classify a task against the current file state.
///
/// Equal timestamps count as fresh; only a strictly newer input makes a
/// task stale.
pub fn freshness(task: &Task, fs: &dyn FileSystem) -> Freshness {
    if task.produces().is_empty() {
        return Freshness::NoOutputs;
    }

    let mut oldest_output: Option<(SystemTime, &PathBuf)> = None;
    for path in task.produces() {
        let Some(mtime) = fs.modified(path) else {
            return Freshness::MissingOutput(path.clone());
        };
        if oldest_output.is_none_or(|(t, _)| mtime < t) {
            oldest_output = Some((mtime, path));
        }
    }

    if task.always_fresh() {
        return Freshness::AlwaysFresh;
    }
    if task.consumes().is_empty() {
        return Freshness::NoInputs;
    }

    let mut newest_input: Option<(SystemTime, &PathBuf)> = None;
    for path in task.consumes() {
        let Some(mtime) = fs.modified(path) else {
            return Freshness::MissingInput(path.clone());
        };
        if newest_input.is_none_or(|(t, _)| mtime > t) {
            newest_input = Some((mtime, path));
        }
    }

    match (newest_input, oldest_output) {
        (Some((input_time, input)), Some((output_time, output))) if input_time > output_time => {
            Freshness::StaleInput {
                input: input.clone(),
                output: output.clone(),
            }
        }
        _ => Freshness::UpToDate,
    }
}

/// Whether the task's own file state requires it to run.
pub fn needs_run(task: &Task, fs: &dyn FileSystem) -> bool {
    freshness(task, fs).needs_run()
}

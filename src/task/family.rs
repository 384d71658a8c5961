// src/task/family.rs

use super::{Task, TaskBuilder, TaskError};

/// Expand a task family: one task per parameter, each built by `make`.
///
/// `make` receives the parameter and returns the builder for that member;
/// it is expected to give the member an id like `name:param` (see
/// [`TaskId::with_param`](crate::types::TaskId::with_param)). Members are
/// returned in parameter order and materialized once, at graph
/// construction.
pub fn expand_family<I, S, F>(params: I, mut make: F) -> Result<Vec<Task>, TaskError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(&str) -> TaskBuilder,
{
    params
        .into_iter()
        .map(|param| make(param.as_ref()).build())
        .collect()
}

// src/config/validate.rs

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::dag::TaskGraph;
use crate::errors::{PipedagError, Result};
use crate::task::{Task, TaskBuilder, Work, expand_family};
use crate::types::TaskId;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_global_config(&raw)?;
        let graph = build_graph(&raw.task)?;
        Ok(ConfigFile::new_unchecked(raw, graph))
    }
}

/// Validate a raw config without keeping the result.
pub fn validate_config(raw: &RawConfigFile) -> Result<()> {
    validate_global_config(raw)?;
    build_graph(&raw.task).map(|_| ())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.workers == Some(0) {
        return Err(PipedagError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.subscriber_buffer == 0 {
        return Err(PipedagError::ConfigError(
            "[config].subscriber_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.worker_program.is_none() && !cfg.config.worker_args.is_empty() {
        return Err(PipedagError::ConfigError(
            "[config].worker_args requires [config].worker_program".to_string(),
        ));
    }
    Ok(())
}

/// Build every task and check that together they form a DAG.
fn build_graph(entries: &[TaskConfig]) -> Result<TaskGraph> {
    let mut tasks = Vec::new();
    for entry in entries {
        tasks.extend(entry_tasks(entry)?);
    }

    let graph = TaskGraph::from_tasks(tasks)?;
    graph.order()?;
    debug!(tasks = graph.len(), "task graph validated");
    Ok(graph)
}

fn entry_tasks(entry: &TaskConfig) -> Result<Vec<Task>> {
    let kinds = [entry.cmd.is_some(), entry.exec.is_some(), entry.stage.is_some()];
    if kinds.iter().filter(|set| **set).count() > 1 {
        return Err(PipedagError::ConfigError(format!(
            "task '{}' sets more than one of `cmd`, `exec` and `stage`",
            entry.name
        )));
    }
    if matches!(&entry.exec, Some(argv) if argv.is_empty()) {
        return Err(PipedagError::ConfigError(format!(
            "task '{}' has an empty `exec` list",
            entry.name
        )));
    }

    if entry.for_each.is_empty() {
        return Ok(vec![builder_for(entry, TaskId::new(&entry.name), |s| s.to_string()).build()?]);
    }

    let tasks = expand_family(&entry.for_each, |item| {
        builder_for(entry, TaskId::with_param(&entry.name, item), |s| {
            s.replace("{item}", item)
        })
    })?;
    Ok(tasks)
}

fn builder_for(entry: &TaskConfig, id: TaskId, subst: impl Fn(&str) -> String) -> TaskBuilder {
    let mut builder = TaskBuilder::new(id)
        .consumes_all(entry.consumes.iter().map(|p| subst(p)))
        .produces_all(entry.produces.iter().map(|p| subst(p)))
        .always_fresh(entry.always_fresh);

    for dep in &entry.after {
        builder = builder.after(subst(dep));
    }
    if let Some(pattern) = &entry.step_pattern {
        builder = builder.step_pattern(pattern.as_str());
    }

    let work = match (&entry.cmd, &entry.exec, &entry.stage) {
        (Some(cmd), _, _) => Some(Work::Shell(subst(cmd))),
        (_, Some(argv), _) => argv.split_first().map(|(program, args)| Work::Exec {
            program: subst(program),
            args: args.iter().map(|a| subst(a)).collect(),
        }),
        (_, _, Some(stage)) => Some(Work::Stage(stage.clone())),
        _ => None,
    };
    match work {
        Some(work) => builder.work(work),
        None => builder,
    }
}

// src/exec/worker.rs

//! The worker side of a job: run the shipped tasks one after another and
//! report every lifecycle change before moving on.

use std::any::Any;
use std::fs;
use std::io::{self, Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Context;
use regex::Regex;
use tracing::{error, info, info_span, warn};

use super::command::{build_command, run_command};
use super::protocol::{TaskSpec, WorkerJob};
use super::stage::{StageContext, StageRegistry};
use crate::bus::{ProgressEvent, Publisher};
use crate::engine::JobOutcome;
use crate::task::Work;
use crate::task::work::Placeholders;
use crate::types::{JobId, TaskId};

/// Where a worker sends its events.
pub trait EventSink {
    fn emit(&mut self, event: ProgressEvent) -> io::Result<()>;
}

/// Newline-delimited JSON, flushed after every event. This is the worker
/// process's stdout format.
#[derive(Debug)]
pub struct JsonLines<W> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> EventSink for JsonLines<W> {
    fn emit(&mut self, event: ProgressEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &event)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

/// In-process execution publishes straight onto the bus.
impl EventSink for Publisher {
    fn emit(&mut self, event: ProgressEvent) -> io::Result<()> {
        if self.publish(event) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "event bus is shut down",
            ))
        }
    }
}

impl EventSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) -> io::Result<()> {
        self.push(event);
        Ok(())
    }
}

/// How a single task ended, when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskFailure {
    /// Typed failure of the work itself.
    Failed(String),
    /// The work could not run to a verdict.
    Crashed(String),
}

/// Summary of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub outcome: JobOutcome,
    /// Tasks that were started, in order.
    pub executed: Vec<TaskId>,
    pub message: Option<String>,
}

/// Run every task of `job` in order, stopping at the first failure.
///
/// Emits `started` before and `succeeded`/`failed`/`fatal` after each task.
/// Panics inside a stage are caught and reported as an execution error.
/// If the sink breaks the run stops with an execution error as well.
pub fn execute_plan(
    job: &WorkerJob,
    stages: &StageRegistry,
    sink: &mut dyn EventSink,
) -> WorkerReport {
    let mut executed = Vec::with_capacity(job.tasks.len());

    for spec in &job.tasks {
        let span = info_span!("task", job = %job.job_id, task = %spec.id);
        let _enter = span.enter();

        if let Err(e) = sink.emit(ProgressEvent::started(&job.job_id, &spec.id)) {
            return broken_sink(executed, e);
        }
        executed.push(spec.id.clone());

        let result = catch_unwind(AssertUnwindSafe(|| {
            run_task(&job.job_id, spec, stages, &mut *sink)
        }));
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(failure)) => Some(failure),
            Err(panic) => Some(TaskFailure::Crashed(format!(
                "stage panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        let (event, outcome, message) = match failure {
            None => {
                info!("task succeeded");
                if let Err(e) = sink.emit(ProgressEvent::succeeded(&job.job_id, Some(&spec.id))) {
                    return broken_sink(executed, e);
                }
                continue;
            }
            Some(TaskFailure::Failed(msg)) => {
                warn!(reason = %msg, "task failed");
                let event = ProgressEvent::failed(&job.job_id, Some(&spec.id), msg.clone());
                (event, JobOutcome::TaskFailed, msg)
            }
            Some(TaskFailure::Crashed(msg)) => {
                error!(reason = %msg, "task crashed");
                let event = ProgressEvent::fatal(&job.job_id, Some(&spec.id), msg.clone());
                (event, JobOutcome::ExecutionError, msg)
            }
        };

        if let Err(e) = sink.emit(event) {
            warn!(error = %e, "could not report task failure");
        }
        return WorkerReport {
            outcome,
            executed,
            message: Some(format!("task '{}' {}", spec.id, message)),
        };
    }

    WorkerReport {
        outcome: JobOutcome::AllSucceeded,
        executed,
        message: None,
    }
}

fn broken_sink(executed: Vec<TaskId>, e: io::Error) -> WorkerReport {
    error!(error = %e, "event channel closed; aborting job");
    WorkerReport {
        outcome: JobOutcome::ExecutionError,
        executed,
        message: Some(format!("event channel closed: {e}")),
    }
}

fn run_task(
    job_id: &JobId,
    spec: &TaskSpec,
    stages: &StageRegistry,
    sink: &mut dyn EventSink,
) -> Result<(), TaskFailure> {
    for path in &spec.produces {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                TaskFailure::Crashed(format!("creating directory {}: {e}", parent.display()))
            })?;
        }
    }

    let Some(work) = &spec.work else {
        return Ok(());
    };

    let mut report =
        |msg: &str| sink.emit(ProgressEvent::step(job_id, &spec.id, msg));

    match work {
        Work::Stage(name) => {
            let stage = stages
                .get(name)
                .ok_or_else(|| TaskFailure::Crashed(format!("unknown stage '{name}'")))?;

            let mut ctx =
                StageContext::new(&spec.id, &spec.consumes, &spec.produces, &mut report);
            let result = stage.run(&mut ctx);
            if let Some(e) = ctx.take_report_error() {
                return Err(TaskFailure::Crashed(format!("reporting progress: {e}")));
            }
            result.map_err(|e| TaskFailure::Failed(e.to_string()))
        }
        Work::Shell(_) | Work::Exec { .. } => {
            let placeholders = Placeholders::new(&spec.consumes, &spec.produces);
            let cmd = build_command(work, placeholders).map_err(TaskFailure::Crashed)?;
            let pattern = match &spec.step_pattern {
                Some(p) => Some(
                    Regex::new(p)
                        .map_err(|e| TaskFailure::Crashed(format!("invalid step_pattern: {e}")))?,
                ),
                None => None,
            };
            run_command(cmd, &spec.id, pattern.as_ref(), &mut report)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Entry point of the `worker` subcommand: read one job from `input`, write
/// events to `output`, return the outcome whose code becomes the exit
/// status.
pub fn run_worker(
    input: impl Read,
    output: impl Write,
    stages: &StageRegistry,
) -> anyhow::Result<JobOutcome> {
    let job: WorkerJob =
        serde_json::from_reader(input).context("decoding worker job from stdin")?;
    info!(job = %job.job_id, tasks = job.tasks.len(), "worker started");

    let mut sink = JsonLines::new(output);
    let report = execute_plan(&job, stages, &mut sink);

    info!(
        job = %job.job_id,
        outcome = ?report.outcome,
        executed = report.executed.len(),
        "worker finished"
    );
    Ok(report.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use crate::exec::StageError;

    fn spec(id: &str, work: Option<Work>) -> TaskSpec {
        TaskSpec {
            id: id.into(),
            consumes: Vec::new(),
            produces: Vec::new(),
            work,
            step_pattern: None,
        }
    }

    fn kinds(events: &[ProgressEvent]) -> Vec<(EventKind, String)> {
        events
            .iter()
            .map(|e| (e.kind, e.task_id.as_ref().map(ToString::to_string).unwrap_or_default()))
            .collect()
    }

    fn ok_stage(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        ctx.step("halfway");
        Ok(())
    }

    fn failing_stage(_: &mut StageContext<'_>) -> Result<(), StageError> {
        Err(StageError::failed("no lyrics found"))
    }

    fn panicking_stage(_: &mut StageContext<'_>) -> Result<(), StageError> {
        panic!("aligner exploded")
    }

    fn registry() -> StageRegistry {
        let mut stages = StageRegistry::new();
        stages
            .register("ok", ok_stage)
            .register("fail", failing_stage)
            .register("boom", panicking_stage);
        stages
    }

    #[test]
    fn emits_start_and_success_per_task_in_order() {
        let job = WorkerJob {
            job_id: "j".into(),
            tasks: vec![
                spec("a", Some(Work::Stage("ok".into()))),
                spec("group", None),
            ],
        };
        let mut events = Vec::new();
        let report = execute_plan(&job, &registry(), &mut events);

        assert_eq!(report.outcome, JobOutcome::AllSucceeded);
        assert_eq!(
            kinds(&events),
            [
                (EventKind::Started, "a".to_string()),
                (EventKind::Step, "a".to_string()),
                (EventKind::Succeeded, "a".to_string()),
                (EventKind::Started, "group".to_string()),
                (EventKind::Succeeded, "group".to_string()),
            ]
        );
        assert_eq!(events[1].payload.as_deref(), Some("halfway"));
    }

    #[test]
    fn typed_failure_stops_the_job() {
        let job = WorkerJob {
            job_id: "j".into(),
            tasks: vec![
                spec("a", Some(Work::Stage("fail".into()))),
                spec("b", Some(Work::Stage("ok".into()))),
            ],
        };
        let mut events = Vec::new();
        let report = execute_plan(&job, &registry(), &mut events);

        assert_eq!(report.outcome, JobOutcome::TaskFailed);
        assert_eq!(report.executed, vec![TaskId::from("a")]);
        assert_eq!(events.last().unwrap().kind, EventKind::Failed);
        assert!(events.iter().all(|e| e.task_id.as_ref().unwrap().as_str() == "a"));
    }

    #[test]
    fn panics_and_unknown_stages_are_execution_errors() {
        for stage in ["boom", "missing"] {
            let job = WorkerJob {
                job_id: "j".into(),
                tasks: vec![spec("a", Some(Work::Stage(stage.into())))],
            };
            let mut events = Vec::new();
            let report = execute_plan(&job, &registry(), &mut events);
            assert_eq!(report.outcome, JobOutcome::ExecutionError, "stage {stage}");
            assert_eq!(events.last().unwrap().kind, EventKind::Fatal);
        }
    }

    #[cfg(unix)]
    #[test]
    fn shell_exit_codes_and_signals_are_distinguished() {
        let cases = [
            ("echo step-1; echo noise; echo step-2", JobOutcome::AllSucceeded),
            ("exit 1", JobOutcome::TaskFailed),
            ("kill -9 $$", JobOutcome::ExecutionError),
        ];
        for (cmd, expected) in cases {
            let mut task = spec("sh", Some(Work::Shell(cmd.into())));
            task.step_pattern = Some("^step".into());
            let job = WorkerJob {
                job_id: "j".into(),
                tasks: vec![task],
            };
            let mut events = Vec::new();
            let report = execute_plan(&job, &StageRegistry::new(), &mut events);
            assert_eq!(report.outcome, expected, "command {cmd}");

            if expected == JobOutcome::AllSucceeded {
                let steps: Vec<_> = events
                    .iter()
                    .filter(|e| e.kind == EventKind::Step)
                    .filter_map(|e| e.payload.clone())
                    .collect();
                assert_eq!(steps, ["step-1", "step-2"]);
            }
        }
    }

    #[test]
    fn worker_reads_a_job_and_writes_json_lines() {
        let job = WorkerJob {
            job_id: "song".into(),
            tasks: vec![spec("group", None)],
        };
        let input = serde_json::to_vec(&job).unwrap();
        let mut output = Vec::new();

        let outcome =
            run_worker(input.as_slice(), &mut output, &StageRegistry::with_builtins()).unwrap();
        assert_eq!(outcome, JobOutcome::AllSucceeded);

        let lines: Vec<ProgressEvent> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, EventKind::Started);
    }
}

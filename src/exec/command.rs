// src/exec/command.rs

//! Blocking execution of `Shell` and `Exec` work inside a worker.

use std::io::{BufRead, BufReader};
use std::process::{Command, ExitStatus, Stdio};

use regex::Regex;
use tracing::{debug, info, warn};

use super::stage::StepReporter;
use super::worker::TaskFailure;
use crate::task::Work;
use crate::task::work::Placeholders;
use crate::types::TaskId;

/// Build the OS command for `Shell` or `Exec` work, expanding placeholders.
pub(crate) fn build_command(work: &Work, placeholders: Placeholders<'_>) -> Result<Command, String> {
    let cmd = match work {
        Work::Shell(template) => {
            let line = placeholders.expand_shell(template)?;
            let mut c = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C");
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c");
                c
            };
            c.arg(line);
            c
        }
        Work::Exec { program, args } => {
            let mut c = Command::new(program);
            c.args(placeholders.expand_args(args)?);
            c
        }
        Work::Stage(name) => return Err(format!("stage '{name}' is not a command")),
    };
    Ok(cmd)
}

/// Run a command to completion.
///
/// Stdout lines matching `pattern` (all lines when `None`) are reported as
/// progress steps; stderr is inherited. A non-zero exit code is a task
/// failure; failing to spawn or dying from a signal is a crash.
pub(crate) fn run_command(
    mut cmd: Command,
    task_id: &TaskId,
    pattern: Option<&Regex>,
    report: &mut StepReporter<'_>,
) -> Result<(), TaskFailure> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    info!(task = %task_id, cmd = ?cmd, "starting task process");
    let mut child = cmd
        .spawn()
        .map_err(|e| TaskFailure::Crashed(format!("spawning process for task '{task_id}': {e}")))?;

    if let Some(stdout) = child.stdout.take() {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(task = %task_id, error = %e, "failed reading task stdout");
                    break;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            if pattern.is_some_and(|re| !re.is_match(line)) {
                debug!(task = %task_id, "stdout: {}", line);
                continue;
            }
            if let Err(e) = report(line) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TaskFailure::Crashed(format!("reporting progress: {e}")));
            }
        }
    }

    let status = child
        .wait()
        .map_err(|e| TaskFailure::Crashed(format!("waiting for task '{task_id}': {e}")))?;

    info!(
        task = %task_id,
        exit_code = ?status.code(),
        success = status.success(),
        "task process exited"
    );

    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(TaskFailure::Failed(format!("exited with status {code}"))),
        None => Err(TaskFailure::Crashed(describe_abnormal_exit(status))),
    }
}

#[cfg(unix)]
fn describe_abnormal_exit(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(sig) => format!("terminated by signal {sig}"),
        None => "terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_abnormal_exit(_status: ExitStatus) -> String {
    "terminated abnormally".to_string()
}

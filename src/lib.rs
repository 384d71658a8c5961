// src/lib.rs

pub mod bus;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod task;
pub mod types;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, error, info};

use crate::bus::{Subscription, sse_stream};
use crate::cli::{CliArgs, Command, EventFormat};
use crate::config::{ConfigFile, ConfigSection, RawConfigFile, load_and_validate};
use crate::dag::{Target, TaskGraph, plan};
use crate::engine::{JobOutcome, Services};
use crate::exec::{ProcessBackend, StageRegistry, run_worker};
use crate::fs::RealFileSystem;
use crate::pipeline::KaraokeJob;
use crate::types::JobId;

/// High-level entry point used by `main.rs`. Returns the process exit code:
/// the job's result code, or the worker outcome for `pipedag worker`.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Worker => Ok(worker_main().await),

        Command::Plan { targets } => {
            let cfg = load_config(&args.config)?;
            print_plan(cfg.graph(), &targets, &default_job_id(&args.config))?;
            Ok(0)
        }

        Command::Run {
            targets,
            job_id,
            format,
        } => {
            let cfg = load_config(&args.config)?;
            let job_id = job_id
                .map(JobId::new)
                .unwrap_or_else(|| default_job_id(&args.config));
            run_job(&cfg.config, cfg.graph(), &targets, job_id, format).await
        }

        Command::Karaoke {
            input,
            output_dir,
            youtube_url,
            targets,
            job_id,
            format,
            dry_run,
        } => {
            // The config file is optional here; it only tunes commands.
            let cfg = if args.config.exists() {
                load_config(&args.config)?
            } else {
                ConfigFile::try_from(RawConfigFile::default())?
            };

            let mut job = KaraokeJob::new(input);
            if let Some(dir) = output_dir {
                job = job.with_output_dir(dir);
            }
            if let Some(url) = youtube_url {
                job = job.with_youtube_url(url);
            }
            let graph = job.graph(&cfg.karaoke)?;
            let job_id = job_id.map(JobId::new).unwrap_or_else(|| job.job_id());

            if dry_run {
                print_plan(&graph, &targets, &job_id)?;
                return Ok(0);
            }
            run_job(&cfg.config, &graph, &targets, job_id, format).await
        }
    }
}

fn load_config(path: &Path) -> Result<ConfigFile> {
    load_and_validate(path).with_context(|| format!("loading config {}", path.display()))
}

fn default_job_id(config_path: &Path) -> JobId {
    let stem = config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pipedag".to_string());
    JobId::new(stem)
}

fn resolve_targets(graph: &TaskGraph, raw: &[String]) -> Vec<Target> {
    raw.iter().map(|t| graph.resolve_target(t)).collect()
}

/// Start the services, run one job and stream its events to stdout until
/// the bus shuts down.
async fn run_job(
    settings: &ConfigSection,
    graph: &TaskGraph,
    raw_targets: &[String],
    job_id: JobId,
    format: EventFormat,
) -> Result<i32> {
    let backend = match &settings.worker_program {
        Some(program) => ProcessBackend::new(program, settings.worker_args.clone()),
        None => ProcessBackend::current_exe()?,
    };
    let services = Services::start(
        settings.service_options(),
        Arc::new(backend),
        Arc::new(RealFileSystem),
    );

    let printer = tokio::spawn(print_events(
        services.bus().subscribe(),
        job_id.clone(),
        format,
    ));

    let targets = resolve_targets(graph, raw_targets);
    let result = services.scheduler().run(graph, &targets, job_id).await;
    services.shutdown().await;

    match printer.await {
        Ok(Err(e)) => error!(error = %e, "writing progress events failed"),
        Err(e) => error!(error = %e, "event printer ended abnormally"),
        Ok(Ok(())) => {}
    }

    info!(
        job = %result.job_id,
        code = result.code(),
        executed = result.executed.len(),
        skipped = result.skipped.len(),
        "done"
    );
    if let Some(message) = &result.message {
        if !result.outcome.is_success() {
            eprintln!("pipedag: {message}");
        }
    }
    Ok(result.code())
}

async fn print_events(sub: Subscription, job_id: JobId, format: EventFormat) -> Result<()> {
    match format {
        EventFormat::Sse => {
            let mut frames = Box::pin(sse_stream(sub, Some(job_id)));
            while let Some(frame) = frames.next().await {
                let mut out = std::io::stdout().lock();
                out.write_all(frame.as_bytes())?;
                out.flush()?;
            }
        }
        EventFormat::Json => {
            let mut events = Box::pin(sub.into_stream().filter(move |e| {
                futures::future::ready(e.job_id == job_id)
            }));
            while let Some(event) = events.next().await {
                let line = serde_json::to_string(&event.to_wire())?;
                let mut out = std::io::stdout().lock();
                writeln!(out, "{line}")?;
                out.flush()?;
            }
        }
    }
    Ok(())
}

/// Dry run: print each selected task with the planner's decision.
fn print_plan(graph: &TaskGraph, raw_targets: &[String], job_id: &JobId) -> Result<()> {
    let targets = resolve_targets(graph, raw_targets);
    let plan = plan(graph, &targets, &RealFileSystem)?;

    println!("pipedag plan for job '{job_id}'");
    println!(
        "  {} to run, {} up to date",
        plan.to_run().count(),
        plan.skipped().count()
    );
    println!();
    for step in plan.steps() {
        println!("  {:<28} {}", step.task.id().as_str(), step.decision);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

/// Worker process: job on stdin, progress events on stdout.
async fn worker_main() -> i32 {
    let outcome = tokio::task::spawn_blocking(|| {
        let registry = StageRegistry::with_builtins();
        run_worker(std::io::stdin().lock(), std::io::stdout().lock(), &registry)
    })
    .await;

    match outcome {
        Ok(Ok(outcome)) => outcome.code(),
        Ok(Err(e)) => {
            let chain = format!("{e:#}");
            error!(error = %chain, "worker failed");
            JobOutcome::ExecutionError.code()
        }
        Err(e) => {
            error!(error = %e, "worker thread failed");
            JobOutcome::ExecutionError.code()
        }
    }
}

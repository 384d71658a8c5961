// tests/scheduler_inline.rs

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, SystemTime};

use pipedag::config::ConfigFile;
use pipedag::dag::Target;
use pipedag::engine::{JobOutcome, ServiceOptions, Services};
use pipedag::exec::{StageContext, StageError, StageRegistry, builtin};
use pipedag::fs::RealFileSystem;
use pipedag::types::{JobId, TaskId};
use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use pipedag_test_utils::events::{collect_until_terminal, summarize};
use pipedag_test_utils::inline_backend::InlineBackend;
use pipedag_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn reject(_ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    Err(StageError::failed("rejected on purpose"))
}

fn stages() -> StageRegistry {
    let mut stages = StageRegistry::with_builtins();
    stages.register("reject", reject);
    stages
}

fn start(backend: InlineBackend, workers: usize) -> Services {
    Services::start(
        ServiceOptions {
            workers,
            ..ServiceOptions::default()
        },
        Arc::new(backend),
        Arc::new(RealFileSystem),
    )
}

fn ids(names: &[&str]) -> Vec<TaskId> {
    names.iter().map(|n| TaskId::from(*n)).collect()
}

fn p(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

/// in.txt -> a -> a.txt -> b -> b.txt -> c -> c.txt, all copies.
fn chain(dir: &TempDir) -> ConfigFile {
    ConfigFileBuilder::new()
        .with_task(
            TaskConfigBuilder::new("a")
                .consumes(&p(dir, "in.txt"))
                .produces(&p(dir, "a.txt"))
                .stage("copy")
                .build(),
        )
        .with_task(
            TaskConfigBuilder::new("b")
                .consumes(&p(dir, "a.txt"))
                .produces(&p(dir, "b.txt"))
                .stage("copy")
                .build(),
        )
        .with_task(
            TaskConfigBuilder::new("c")
                .consumes(&p(dir, "b.txt"))
                .produces(&p(dir, "c.txt"))
                .stage("copy")
                .build(),
        )
        .build()
}

fn set_mtime(path: &Path, time: SystemTime) -> std::io::Result<()> {
    fs::File::options().write(true).open(path)?.set_modified(time)
}

#[tokio::test]
async fn second_run_of_a_finished_job_executes_nothing() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    fs::write(dir.path().join("in.txt"), "hello")?;
    let cfg = chain(&dir);
    let services = start(InlineBackend::new(stages()), 2);
    let mut sub = services.bus().subscribe();

    let first = with_timeout(services.scheduler().run(cfg.graph(), &[], "chain".into())).await;
    assert_eq!(first.outcome, JobOutcome::AllSucceeded);
    assert_eq!(first.executed, ids(&["a", "b", "c"]));
    assert_eq!(fs::read_to_string(dir.path().join("c.txt"))?, "hello");
    let events = with_timeout(collect_until_terminal(&mut sub, &"chain".into())).await;
    // started, step, succeeded per task plus the job event.
    assert_eq!(events.len(), 10);

    let second = with_timeout(services.scheduler().run(cfg.graph(), &[], "chain".into())).await;
    assert_eq!(second.outcome, JobOutcome::AllSucceeded);
    assert!(second.executed.is_empty());
    assert_eq!(second.skipped.len(), 3);

    let events = with_timeout(collect_until_terminal(&mut sub, &"chain".into())).await;
    assert_eq!(summarize(&events), ["succeeded -"]);

    services.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn touching_a_middle_input_reruns_only_downstream_tasks() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    fs::write(dir.path().join("in.txt"), "v1")?;
    let cfg = chain(&dir);
    let services = start(InlineBackend::new(stages()), 1);
    let mut sub = services.bus().subscribe();

    let first = with_timeout(services.scheduler().run(cfg.graph(), &[], "chain".into())).await;
    assert!(first.outcome.is_success());
    with_timeout(collect_until_terminal(&mut sub, &"chain".into())).await;

    // Make a.txt strictly newer than b.txt regardless of timestamp
    // granularity.
    let later = SystemTime::now() + Duration::from_secs(60);
    fs::write(dir.path().join("a.txt"), "v2")?;
    set_mtime(&dir.path().join("a.txt"), later)?;

    let second = with_timeout(services.scheduler().run(cfg.graph(), &[], "chain".into())).await;
    assert_eq!(second.executed, ids(&["b", "c"]));
    assert_eq!(second.skipped, ids(&["a"]));
    assert_eq!(fs::read_to_string(dir.path().join("c.txt"))?, "v2");

    let events = with_timeout(collect_until_terminal(&mut sub, &"chain".into())).await;
    assert_eq!(
        summarize(&events),
        [
            "started b",
            "step b",
            "succeeded b",
            "started c",
            "step c",
            "succeeded c",
            "succeeded -",
        ]
    );

    services.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn dropping_one_subscriber_mid_job_leaves_the_other_complete() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    fs::write(dir.path().join("in.txt"), "fan")?;

    // `hold` blocks until the test releases it, then copies like `copy`.
    let (release, gate) = mpsc::channel::<()>();
    let gate = Mutex::new(gate);
    let mut stages = stages();
    stages.register("hold", move |ctx: &mut StageContext<'_>| -> Result<(), StageError> {
        gate.lock()
            .unwrap_or_else(|e| e.into_inner())
            .recv_timeout(Duration::from_secs(10))
            .map_err(|e| StageError::failed(format!("never released: {e}")))?;
        builtin::copy(ctx)
    });

    let cfg = ConfigFileBuilder::new()
        .with_task(
            TaskConfigBuilder::new("a")
                .consumes(&p(&dir, "in.txt"))
                .produces(&p(&dir, "a.txt"))
                .stage("copy")
                .build(),
        )
        .with_task(
            TaskConfigBuilder::new("b")
                .consumes(&p(&dir, "a.txt"))
                .produces(&p(&dir, "b.txt"))
                .stage("hold")
                .build(),
        )
        .with_task(
            TaskConfigBuilder::new("c")
                .consumes(&p(&dir, "b.txt"))
                .produces(&p(&dir, "c.txt"))
                .stage("copy")
                .build(),
        )
        .build();

    let services = start(InlineBackend::new(stages), 1);
    let job = JobId::new("fan");
    let mut first = services.bus().subscribe();
    let mut second = services.bus().subscribe();

    let handle = services.scheduler().submit(cfg.graph(), &[], job.clone()).await?;
    loop {
        let event = with_timeout(first.recv()).await.ok_or("bus closed early")?;
        if event.task_id == Some("b".into()) {
            break;
        }
    }
    drop(first);
    assert_eq!(services.bus().subscriber_count(), 1);
    release.send(())?;

    let events = with_timeout(collect_until_terminal(&mut second, &job)).await;
    let result = with_timeout(handle.wait()).await;
    assert_eq!(result.outcome, JobOutcome::AllSucceeded);
    assert_eq!(
        summarize(&events),
        [
            "started a",
            "step a",
            "succeeded a",
            "started b",
            "step b",
            "succeeded b",
            "started c",
            "step c",
            "succeeded c",
            "succeeded -",
        ]
    );
    assert_eq!(second.dropped(), 0);

    services.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn a_failing_task_stops_its_job_without_affecting_others() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    fs::write(dir.path().join("in.txt"), "x")?;

    let failing = ConfigFileBuilder::new()
        .with_task(
            TaskConfigBuilder::new("a")
                .consumes(&p(&dir, "in.txt"))
                .produces(&p(&dir, "f-a.txt"))
                .stage("copy")
                .build(),
        )
        .with_task(
            TaskConfigBuilder::new("b")
                .consumes(&p(&dir, "f-a.txt"))
                .produces(&p(&dir, "f-b.txt"))
                .stage("reject")
                .build(),
        )
        .with_task(
            TaskConfigBuilder::new("c")
                .consumes(&p(&dir, "f-b.txt"))
                .produces(&p(&dir, "f-c.txt"))
                .stage("copy")
                .build(),
        )
        .build();
    let healthy = chain(&dir);

    let services = start(InlineBackend::new(stages()), 2);
    let mut sub = services.bus().subscribe();
    let bad_id = JobId::new("bad");
    let good_id = JobId::new("good");

    let bad = services
        .scheduler()
        .submit(failing.graph(), &[], bad_id.clone())
        .await?;
    let good = services
        .scheduler()
        .submit(healthy.graph(), &[], good_id.clone())
        .await?;

    let bad = with_timeout(bad.wait()).await;
    let good = with_timeout(good.wait()).await;

    assert_eq!(bad.outcome, JobOutcome::TaskFailed);
    assert_eq!(bad.code(), 1);
    assert_eq!(bad.executed, ids(&["a", "b"]));
    assert!(bad.message.as_deref().is_some_and(|m| m.contains("rejected on purpose")));
    assert!(!dir.path().join("f-c.txt").exists());
    assert_eq!(fs::read_to_string(dir.path().join("f-a.txt"))?, "x");
    assert_eq!(good.outcome, JobOutcome::AllSucceeded);

    services.shutdown().await;

    let mut bad_events = Vec::new();
    let mut good_events = Vec::new();
    while let Some(event) = sub.recv().await {
        if event.job_id == bad_id {
            bad_events.push(event);
        } else if event.job_id == good_id {
            good_events.push(event);
        }
    }
    assert_eq!(
        summarize(&bad_events),
        ["started a", "step a", "succeeded a", "started b", "failed b", "failed -"]
    );
    assert_eq!(summarize(&good_events).last().map(String::as_str), Some("succeeded -"));
    assert_eq!(good_events.iter().filter(|e| e.is_terminal()).count(), 1);
    Ok(())
}

#[tokio::test]
async fn targets_select_only_what_they_need() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    fs::write(dir.path().join("in.txt"), "t")?;
    let cfg = chain(&dir);
    let services = start(InlineBackend::new(stages()), 1);

    let target = cfg.graph().resolve_target(&p(&dir, "b.txt"));
    assert!(matches!(target, Target::Path(_)));

    let result = with_timeout(services.scheduler().run(cfg.graph(), &[target], "partial".into())).await;
    assert_eq!(result.executed, ids(&["a", "b"]));
    assert!(!dir.path().join("c.txt").exists());

    let unknown = Target::task("nope");
    let rejected =
        with_timeout(services.scheduler().run(cfg.graph(), &[unknown], "partial".into())).await;
    assert_eq!(rejected.outcome, JobOutcome::PreExecutionError);

    services.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn empty_plans_never_reach_the_backend() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    fs::write(dir.path().join("in.txt"), "e")?;
    let cfg = chain(&dir);
    let backend = Arc::new(InlineBackend::new(stages()));
    let services = Services::start(
        ServiceOptions::default(),
        Arc::clone(&backend) as Arc<dyn pipedag::exec::WorkerBackend>,
        Arc::new(RealFileSystem),
    );

    services.scheduler().run(cfg.graph(), &[], "one".into()).await;
    services.scheduler().run(cfg.graph(), &[], "two".into()).await;
    assert_eq!(backend.jobs(), [JobId::new("one")]);

    services.shutdown().await;
    Ok(())
}

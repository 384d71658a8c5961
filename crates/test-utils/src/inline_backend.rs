use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use pipedag::bus::Publisher;
use pipedag::errors::Error;
use pipedag::exec::{StageRegistry, WorkerBackend, WorkerJob, WorkerReport, execute_plan};
use pipedag::types::JobId;

/// A worker backend that runs jobs in-process on the blocking pool instead
/// of spawning a worker process. Events go straight to the bus.
///
/// Records the id of every job it ran.
pub struct InlineBackend {
    stages: Arc<StageRegistry>,
    jobs: Arc<Mutex<Vec<JobId>>>,
}

impl InlineBackend {
    pub fn new(stages: StageRegistry) -> Self {
        Self {
            stages: Arc::new(stages),
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_builtins() -> Self {
        Self::new(StageRegistry::with_builtins())
    }

    /// Ids of the jobs dispatched so far, in dispatch order.
    pub fn jobs(&self) -> Vec<JobId> {
        self.jobs.lock().unwrap().clone()
    }
}

impl WorkerBackend for InlineBackend {
    fn run_job(
        &self,
        job: WorkerJob,
        publisher: Publisher,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerReport, Error>> + Send + '_>> {
        let stages = Arc::clone(&self.stages);
        self.jobs.lock().unwrap().push(job.job_id.clone());

        Box::pin(async move {
            let report = tokio::task::spawn_blocking(move || {
                let mut sink = publisher;
                execute_plan(&job, &stages, &mut sink)
            })
            .await?;
            Ok::<_, Error>(report)
        })
    }
}

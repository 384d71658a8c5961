use pipedag::bus::{ProgressEvent, Subscription};
use pipedag::types::JobId;

/// Receive events until the terminal event of `job_id`, returning every
/// event of that job in arrival order (terminal event included). Events of
/// other jobs are skipped. Returns early if the stream ends.
pub async fn collect_until_terminal(sub: &mut Subscription, job_id: &JobId) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = sub.recv().await {
        if &event.job_id != job_id {
            continue;
        }
        let done = event.is_terminal();
        events.push(event);
        if done {
            break;
        }
    }
    events
}

/// Compact `kind task` strings for assertions, e.g. `"started a"` or
/// `"succeeded -"` for the job event.
pub fn summarize(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| {
            let task = e.task_id.as_ref().map(|t| t.as_str()).unwrap_or("-");
            format!("{} {task}", kind_name(e))
        })
        .collect()
}

fn kind_name(event: &ProgressEvent) -> &'static str {
    use pipedag::bus::EventKind;
    match event.kind {
        EventKind::Started => "started",
        EventKind::Step => "step",
        EventKind::Succeeded => "succeeded",
        EventKind::Failed => "failed",
        EventKind::Fatal => "fatal",
    }
}

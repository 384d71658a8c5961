// src/bus/sse.rs

//! Server-sent-events framing for live listeners.

use futures::{Stream, StreamExt, future};
use tracing::warn;

use super::event::ProgressEvent;
use super::subscriber::Subscription;
use crate::types::JobId;

/// Render one event as an SSE frame: `data: <json>\n\n`.
pub fn sse_frame(event: &ProgressEvent) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(&event.to_wire())?;
    Ok(format!("data: {json}\n\n"))
}

/// Turn a subscription into a stream of SSE frames, optionally limited to
/// one job. The stream ends when the subscription does.
pub fn sse_stream(
    subscription: Subscription,
    job: Option<JobId>,
) -> impl Stream<Item = String> + Send {
    subscription.into_stream().filter_map(move |event| {
        let frame = match &job {
            Some(id) if *id != event.job_id => None,
            _ => match sse_frame(&event) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!(job = %event.job_id, error = %e, "failed to encode event; skipping");
                    None
                }
            },
        };
        future::ready(frame)
    })
}

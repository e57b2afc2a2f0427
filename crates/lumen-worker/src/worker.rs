//! Build loop for the sandboxed worker host.
//!
//! The host pushes [`WorkerRequest`] messages through a channel; the loop
//! performs one full build per processed request and pushes the result
//! back. Requests queued while a build was pending are coalesced: only the
//! newest superseding update runs, the rest are dropped.

use std::sync::Arc;

use tokio::sync::mpsc;

use lumen_core::pipeline::BuildPipeline;

use crate::protocol::{WorkerRequest, WorkerResponse};

/// Handle the host keeps for driving the worker.
pub struct WorkerHandle {
    pub tx: mpsc::UnboundedSender<WorkerRequest>,
    pub rx: mpsc::UnboundedReceiver<WorkerResponse>,
}

/// The worker's build loop.
pub struct ReplWorker {
    pipeline: Arc<BuildPipeline>,
    rx: mpsc::UnboundedReceiver<WorkerRequest>,
    tx: mpsc::UnboundedSender<WorkerResponse>,
}

/// Wire a worker to a pipeline, returning the host-side handle and the
/// loop to spawn.
pub fn channel(pipeline: Arc<BuildPipeline>) -> (WorkerHandle, ReplWorker) {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (rsp_tx, rsp_rx) = mpsc::unbounded_channel();
    (
        WorkerHandle {
            tx: req_tx,
            rx: rsp_rx,
        },
        ReplWorker {
            pipeline,
            rx: req_rx,
            tx: rsp_tx,
        },
    )
}

impl ReplWorker {
    /// Run the message loop until the host drops its handle.
    pub async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            let request = coalesce(request, &mut self.rx);
            match request {
                WorkerRequest::Update { version, options } => {
                    tracing::debug!(version = %version, "worker build requested");
                    let result = self.pipeline.execute(&version, &options).await;
                    if self.tx.send(WorkerResponse::Result { result }).is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("worker loop finished");
    }
}

/// Drain queued requests, keeping only the newest: an update superseded
/// before its build started never runs.
pub fn coalesce(
    first: WorkerRequest,
    rx: &mut mpsc::UnboundedReceiver<WorkerRequest>,
) -> WorkerRequest {
    let mut latest = first;
    let mut dropped = 0usize;
    while let Ok(next) = rx.try_recv() {
        latest = next;
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(dropped, "superseded build requests dropped");
    }
    latest
}

//! Background pipeline worker.
//!
//! The pipeline runs on its own tokio task and reports progress through a
//! bounded channel. The channel closes when the run ends.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{BatchSummary, Pipeline, ProgressEvent, StopHandle};
use crate::document::TemplateSource;
use crate::error::MergeError;

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

pub struct PipelineWorker {
    events: mpsc::Receiver<ProgressEvent>,
    stop: StopHandle,
    handle: JoinHandle<Result<BatchSummary, MergeError>>,
}

/// Start `pipeline` on a background task.
pub fn spawn<T>(pipeline: Pipeline<T>, capacity: usize) -> PipelineWorker
where
    T: TemplateSource + Send + Sync + 'static,
{
    let (sender, events) = mpsc::channel(capacity.max(1));
    let pipeline = pipeline.with_events(sender);
    let stop = pipeline.stop_handle();

    log::debug!("Pipeline worker started");
    let handle = tokio::spawn(async move {
        let result = pipeline.run().await;
        log::debug!("Pipeline worker stopped");
        result
    });

    PipelineWorker {
        events,
        stop,
        handle,
    }
}

impl PipelineWorker {
    /// Next event, `None` once the run has ended.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Ask the run to stop at the next record boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Wait for the run to end, dropping undelivered events.
    pub async fn join(self) -> Result<BatchSummary, MergeError> {
        drop(self.events);
        self.handle
            .await
            .map_err(|e| MergeError::Worker(e.to_string()))?
    }
}

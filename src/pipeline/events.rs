//! Progress events and the stop flag.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::summary::{BatchSummary, SkipReason, Stage};

/// Emitted by a running pipeline, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { records: usize, input_rows: usize },
    Generated { sequence: usize, path: PathBuf },
    Rendered { sequence: usize, path: PathBuf },
    Failed { sequence: usize, stage: Stage, reason: String },
    Sent { sequence: usize, to: String },
    Skipped { sequence: usize, reason: SkipReason },
    Stopped { sequence: usize },
    Finished { summary: BatchSummary },
}

/// Shared stop request, checked between records.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

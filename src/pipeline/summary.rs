//! Batch summary.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Stage at which a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Render,
    Convert,
    Dispatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Render => "render",
            Stage::Convert => "convert",
            Stage::Dispatch => "dispatch",
        };
        f.write_str(label)
    }
}

/// Why a record was not mailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoEmail,
    InvalidEmail,
    NoAttachment,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SkipReason::NoEmail => "no email address",
            SkipReason::InvalidEmail => "invalid email address",
            SkipReason::NoAttachment => "no PDF to attach",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub sequence: usize,
    pub name: String,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchTally {
    pub enabled: bool,
    pub attempted: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of one merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Data rows in the input table, kept or not.
    pub input_rows: usize,
    pub records: usize,
    pub generated: usize,
    pub rendered: usize,
    pub dispatch: DispatchTally,
    pub failures: Vec<RecordFailure>,
    /// The run was stopped before its end.
    pub stopped: bool,
}

impl BatchSummary {
    pub fn new(input_rows: usize, records: usize) -> Self {
        Self {
            input_rows,
            records,
            ..Self::default()
        }
    }

    pub fn fail(&mut self, sequence: usize, name: &str, stage: Stage, reason: impl Into<String>) {
        self.failures.push(RecordFailure {
            sequence,
            name: name.to_string(),
            stage,
            reason: reason.into(),
        });
    }

    pub fn log(&self) {
        log::info!("Rows processed: {}/{}", self.records, self.input_rows);
        log::info!("Documents generated: {}/{}", self.generated, self.records);
        log::info!("PDF rendered: {}/{}", self.rendered, self.generated);
        if self.dispatch.enabled {
            log::info!(
                "Mails: {} sent, {} skipped, {} failed",
                self.dispatch.sent,
                self.dispatch.skipped,
                self.dispatch.failed
            );
        } else {
            log::info!("Mail dispatch disabled");
        }
        for failure in &self.failures {
            log::warn!(
                "#{} {} failed at {}: {}",
                failure.sequence,
                failure.name,
                failure.stage,
                failure.reason
            );
        }
        if self.stopped {
            log::warn!("Run stopped before completion");
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = self.to_json().map_err(std::io::Error::other)?;
        fs::write(path, json)
    }
}

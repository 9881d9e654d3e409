//! Record source - reads the recipient table that drives a merge.
//!
//! - `encoding` - legacy-tolerant text decoding
//! - `source` - CSV parsing into [`RecordSet`]

pub mod encoding;
pub mod source;

pub use encoding::{decode_text, read_text_file};
pub use source::read_records;

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the input table.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input table not found or unreadable: {path}: {source}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One row of the input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Display name, never blank.
    pub name: String,
    /// Recipient address, empty when the row has none.
    pub email: String,
}

impl Record {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }
}

/// Records kept from the input table, plus the number of data rows read.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub total_rows: usize,
    /// Source lines of the rows dropped for a blank name.
    pub dropped_lines: Vec<u64>,
}

impl RecordSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}

//! Format conversion - DOCX to PDF through an external rasterizer.
//!
//! - `soffice` - headless office suite rasterizer

pub mod soffice;

pub use soffice::SofficeRasterizer;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::document::common::safe_email_for_filename;
use crate::records::Record;

/// Errors raised by a rasterizer.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The converter program cannot be started at all. Fatal for the run.
    #[error(
        "converter '{program}' could not be started ({source}); install LibreOffice or set CONVERTER_BIN"
    )]
    Environment {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to prepare conversion workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("conversion of {input} failed: {reason}")]
    Failed { input: PathBuf, reason: String },
}

impl ConversionError {
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment { .. })
    }
}

/// Produces a PDF from a document file.
pub trait Rasterizer: Send + Sync {
    /// Convert `input` and write the PDF at exactly `output`.
    fn rasterize(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

/// Names PDF outputs after their document and recipient, then delegates to a
/// [`Rasterizer`].
pub struct FormatConverter {
    rasterizer: Box<dyn Rasterizer>,
    output_dir: PathBuf,
}

impl FormatConverter {
    pub fn new(rasterizer: Box<dyn Rasterizer>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            rasterizer,
            output_dir: output_dir.into(),
        }
    }

    /// `<document stem>[_<safe email>].pdf` in the output directory.
    pub fn output_path(&self, document: &Path, record: &Record) -> PathBuf {
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let file_name = if record.has_email() {
            format!("{}_{}.pdf", stem, safe_email_for_filename(&record.email))
        } else {
            format!("{}.pdf", stem)
        };
        self.output_dir.join(file_name)
    }

    pub fn convert(&self, document: &Path, record: &Record) -> Result<PathBuf, ConversionError> {
        let output = self.output_path(document, record);
        self.rasterizer.rasterize(document, &output)?;

        if !output.is_file() {
            return Err(ConversionError::Failed {
                input: document.to_path_buf(),
                reason: format!("no PDF produced at {}", output.display()),
            });
        }

        let size = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
        log::info!("PDF ready: {} ({} bytes)", output.display(), size);
        Ok(output)
    }
}

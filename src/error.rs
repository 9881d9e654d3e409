//! Batch-fatal errors and their process exit codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::convert::ConversionError;
use crate::records::SourceError;

/// Conditions that stop a whole merge run.
///
/// Per-record problems (render, conversion, dispatch) never surface here; they
/// are recorded in the batch summary instead.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("template not found: {0}")]
    TemplateNotFound(PathBuf),
    #[error("template must be a .docx file: {0}")]
    InvalidTemplate(PathBuf),
    #[error(transparent)]
    MissingInput(#[from] SourceError),
    #[error("no valid row in the input table (column 'nom' required)")]
    NoValidRecords,
    #[error("no document could be generated")]
    NoDocumentsGenerated,
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF conversion unavailable: {0}")]
    ConversionEnvironment(#[source] ConversionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

impl MergeError {
    /// Process exit code reported by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConversionEnvironment(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MergeError::NoValidRecords.exit_code(), 1);
        assert_eq!(
            MergeError::TemplateNotFound(PathBuf::from("modele.docx")).exit_code(),
            1
        );
        let env = ConversionError::Environment {
            program: "soffice".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(MergeError::ConversionEnvironment(env).exit_code(), 2);
    }
}

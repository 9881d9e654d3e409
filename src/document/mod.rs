//! Document module - per-record documents generated from a DOCX template.
//!
//! This module contains:
//! - `model` - narrow traits over a word-processing document (paragraphs, runs, tables)
//! - `substitute` - placeholder replacement across fragmented text runs
//! - `docx` - the DOCX implementation of the model (zip + quick-xml)
//! - `renderer` - load, substitute and save one document per record
//! - `common` - file naming helpers

pub mod common;
pub mod docx;
pub mod model;
pub mod renderer;
pub mod substitute;

pub use docx::{DocxDocument, DocxTemplate};
pub use model::{Cell, DocumentModel, ParagraphModel, Row, Table, TemplateSource, TextRun};
pub use renderer::DocumentRenderer;
pub use substitute::{replace_in_document, replace_in_paragraph, Replacement, SubstitutionStats};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the document model.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read template {path}: {source}")]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to read archive entry: {0}")]
    EntryIo(#[source] std::io::Error),
    #[error("document part '{0}' is missing")]
    MissingPart(String),
    #[error("malformed document XML: {0}")]
    Xml(String),
    #[error("failed to write document {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A document that could not be generated for one record.
#[derive(Debug, Error)]
#[error("failed to render document #{sequence} for '{name}': {source}")]
pub struct RenderError {
    pub sequence: usize,
    pub name: String,
    #[source]
    pub source: DocumentError,
}

/// Result of a successful document generation.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub path: PathBuf,
    pub sequence: usize,
    pub stats: SubstitutionStats,
}

//! Per-record document generation.

use std::path::{Path, PathBuf};

use super::common::document_stem;
use super::model::{DocumentModel, TemplateSource};
use super::substitute::replace_in_document;
use super::{GeneratedDocument, RenderError};
use crate::records::Record;

/// Loads a pristine template copy for each record, substitutes the record
/// name, and saves the result in the output directory.
pub struct DocumentRenderer<T: TemplateSource> {
    template: T,
    placeholder: String,
    output_dir: PathBuf,
    numbered: bool,
}

impl<T: TemplateSource> DocumentRenderer<T> {
    pub fn new(
        template: T,
        placeholder: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        numbered: bool,
    ) -> Self {
        Self {
            template,
            placeholder: placeholder.into(),
            output_dir: output_dir.into(),
            numbered,
        }
    }

    pub fn template(&self) -> &T {
        &self.template
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the document of `record` lands.
    pub fn output_path(&self, record: &Record, sequence: usize) -> PathBuf {
        let sequence = self.numbered.then_some(sequence);
        self.output_dir
            .join(format!("{}.docx", document_stem(&record.name, sequence)))
    }

    /// Render the document of one record.
    ///
    /// # Arguments
    /// * `record` - The record whose name replaces the placeholder.
    /// * `sequence` - 1-based position of the record, used as file prefix.
    pub fn render(&self, record: &Record, sequence: usize) -> Result<GeneratedDocument, RenderError> {
        let wrap = |source| RenderError {
            sequence,
            name: record.name.clone(),
            source,
        };

        let mut document = self.template.load().map_err(wrap)?;
        let stats = replace_in_document(&mut document, &self.placeholder, &record.name);

        if stats.paragraphs() == 0 {
            log::debug!(
                "No occurrence of '{}' in the document of '{}'",
                self.placeholder,
                record.name
            );
        }

        let path = self.output_path(record, sequence);
        document.save(&path).map_err(wrap)?;

        log::info!("Generated {}", path.display());
        Ok(GeneratedDocument {
            path,
            sequence,
            stats,
        })
    }
}

//! Traits over a word-processing document.
//!
//! The substitution logic only needs paragraphs made of text runs, tables made
//! of cells holding paragraphs, and a way to save. Keeping the surface this
//! small lets tests drive the algorithm with in-memory fakes.

use std::path::Path;

use super::DocumentError;

/// A contiguous span of text sharing one formatting.
pub trait TextRun {
    /// Visible text of the run.
    fn text(&self) -> String;

    /// Replace the visible text, keeping the run's formatting.
    fn set_text(&mut self, text: &str);
}

/// A paragraph composed of text runs.
pub trait ParagraphModel {
    type Run: TextRun;

    fn runs(&self) -> &[Self::Run];

    fn runs_mut(&mut self) -> &mut [Self::Run];

    /// Remove every run and re-add `text` as a single unformatted run.
    ///
    /// Paragraph-level properties (style, alignment) are kept.
    fn replace_content(&mut self, text: &str);

    /// Visible text of the whole paragraph.
    fn text(&self) -> String {
        self.runs().iter().map(TextRun::text).collect()
    }
}

/// A table cell.
#[derive(Debug, Clone)]
pub struct Cell<P> {
    pub paragraphs: Vec<P>,
}

impl<P> Default for Cell<P> {
    fn default() -> Self {
        Self {
            paragraphs: Vec::new(),
        }
    }
}

/// A table row.
#[derive(Debug, Clone)]
pub struct Row<P> {
    pub cells: Vec<Cell<P>>,
}

impl<P> Default for Row<P> {
    fn default() -> Self {
        Self { cells: Vec::new() }
    }
}

/// A table of the document body.
#[derive(Debug, Clone)]
pub struct Table<P> {
    pub rows: Vec<Row<P>>,
}

impl<P> Default for Table<P> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<P> Table<P> {
    /// Every paragraph of every cell, row by row.
    pub fn paragraphs_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.rows
            .iter_mut()
            .flat_map(|row| row.cells.iter_mut())
            .flat_map(|cell| cell.paragraphs.iter_mut())
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &P> {
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .flat_map(|cell| cell.paragraphs.iter())
    }
}

/// An editable document instance.
pub trait DocumentModel {
    type Paragraph: ParagraphModel;

    /// Paragraphs of the body, outside tables.
    fn paragraphs(&self) -> &[Self::Paragraph];

    fn paragraphs_mut(&mut self) -> &mut [Self::Paragraph];

    /// Top-level tables of the body.
    fn tables(&self) -> &[Table<Self::Paragraph>];

    fn tables_mut(&mut self) -> &mut [Table<Self::Paragraph>];

    /// Persist the document at `path`.
    fn save(&self, path: &Path) -> Result<(), DocumentError>;

    /// Visible text of body paragraphs then table paragraphs, one per line.
    fn visible_text(&self) -> String {
        let body = self.paragraphs().iter().map(ParagraphModel::text);
        let cells = self
            .tables()
            .iter()
            .flat_map(|table| table.paragraphs().map(ParagraphModel::text));
        body.chain(cells).collect::<Vec<_>>().join("\n")
    }
}

/// Source of pristine document instances.
pub trait TemplateSource {
    type Document: DocumentModel;

    /// Path of the template on disk.
    fn path(&self) -> &Path;

    /// Load a fresh copy; edits to it never reach the template.
    fn load(&self) -> Result<Self::Document, DocumentError>;
}

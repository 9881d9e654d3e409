//! DOCX implementation of the document model.
//!
//! The archive is read with `zip`; only `word/document.xml` is parsed, every
//! other part is written back byte for byte. The XML is kept as a flat event
//! stream in which each paragraph is replaced by a slot pointing into the
//! body or table model, so untouched markup round-trips unchanged.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::model::{Cell, DocumentModel, ParagraphModel, Row, Table, TemplateSource, TextRun};
use super::DocumentError;

const DOCUMENT_PART: &str = "word/document.xml";

const W_P: &[u8] = b"w:p";
const W_PPR: &[u8] = b"w:pPr";
const W_R: &[u8] = b"w:r";
const W_RPR: &[u8] = b"w:rPr";
const W_T: &[u8] = b"w:t";
const W_TAB: &[u8] = b"w:tab";
const W_BR: &[u8] = b"w:br";
const W_CR: &[u8] = b"w:cr";
const W_TBL: &[u8] = b"w:tbl";
const W_TR: &[u8] = b"w:tr";
const W_TC: &[u8] = b"w:tc";

/// Inline elements whose runs are part of the paragraph's visible text.
/// Deleted revisions (`w:del`, `w:moveFrom`) are left out.
const RUN_CONTAINERS: &[&[u8]] = &[
    b"w:hyperlink",
    b"w:ins",
    b"w:moveTo",
    b"w:smartTag",
    b"w:customXml",
    b"w:fldSimple",
    b"w:sdt",
    b"w:sdtContent",
];

type XmlEvent = Event<'static>;

/// A DOCX template on disk, re-read for every document.
#[derive(Debug, Clone)]
pub struct DocxTemplate {
    path: PathBuf,
}

impl DocxTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for DocxTemplate {
    type Document = DocxDocument;

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<DocxDocument, DocumentError> {
        let bytes = fs::read(&self.path).map_err(|source| DocumentError::TemplateIo {
            path: self.path.clone(),
            source,
        })?;
        DocxDocument::from_bytes(&bytes)
    }
}

#[derive(Debug, Clone)]
struct ArchiveEntry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Body(usize),
    Cell {
        table: usize,
        row: usize,
        cell: usize,
        paragraph: usize,
    },
}

#[derive(Debug, Clone)]
enum Node {
    Markup(XmlEvent),
    Paragraph(Slot),
}

/// An in-memory DOCX document.
#[derive(Debug, Clone)]
pub struct DocxDocument {
    entries: Vec<ArchiveEntry>,
    nodes: Vec<Node>,
    body: Vec<DocxParagraph>,
    tables: Vec<Table<DocxParagraph>>,
}

impl DocxDocument {
    /// Parse a DOCX archive.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let mut data = Vec::new();
            file.read_to_end(&mut data).map_err(DocumentError::EntryIo)?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                data,
            });
        }

        let events = {
            let part = entries
                .iter()
                .find(|entry| entry.name == DOCUMENT_PART)
                .ok_or_else(|| DocumentError::MissingPart(DOCUMENT_PART.to_string()))?;
            let xml = std::str::from_utf8(&part.data)
                .map_err(|e| DocumentError::Xml(e.to_string()))?;
            read_events(xml)?
        };

        let mut document = Self {
            entries,
            nodes: Vec::with_capacity(events.len()),
            body: Vec::new(),
            tables: Vec::new(),
        };
        document.build(events)?;
        Ok(document)
    }

    /// Serialize the whole archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        let xml = self.to_xml()?;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            if entry.is_dir {
                writer.add_directory(entry.name.as_str(), options)?;
                continue;
            }

            writer.start_file(entry.name.as_str(), options)?;
            let data = if entry.name == DOCUMENT_PART {
                xml.as_slice()
            } else {
                entry.data.as_slice()
            };
            writer.write_all(data).map_err(DocumentError::EntryIo)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    fn build(&mut self, events: Vec<XmlEvent>) -> Result<(), DocumentError> {
        let mut table_depth = 0usize;
        let mut i = 0;

        while i < events.len() {
            match &events[i] {
                Event::Start(start) => {
                    let name = start.name();
                    let name = name.as_ref();

                    if name == W_P {
                        let len = subtree_len(&events[i..]);
                        if len < 2 {
                            return Err(DocumentError::Xml("unterminated paragraph".to_string()));
                        }
                        let paragraph =
                            DocxParagraph::parse(start.clone(), inner(&events[i..i + len]))?;
                        let slot = self.place(paragraph, table_depth);
                        self.nodes.push(Node::Paragraph(slot));
                        i += len;
                        continue;
                    }

                    if name == W_TBL {
                        if table_depth == 0 {
                            self.tables.push(Table::default());
                        }
                        table_depth += 1;
                    } else if name == W_TR && table_depth == 1 {
                        if let Some(table) = self.tables.last_mut() {
                            table.rows.push(Row::default());
                        }
                    } else if name == W_TC && table_depth == 1 {
                        if let Some(row) = self.tables.last_mut().and_then(|t| t.rows.last_mut()) {
                            row.cells.push(Cell::default());
                        }
                    }
                }
                Event::End(end) if end.name().as_ref() == W_TBL => {
                    table_depth = table_depth.saturating_sub(1);
                }
                _ => {}
            }

            self.nodes.push(Node::Markup(events[i].clone()));
            i += 1;
        }

        Ok(())
    }

    /// Paragraphs inside tables go to the current top-level cell, including
    /// those of nested tables.
    fn place(&mut self, paragraph: DocxParagraph, table_depth: usize) -> Slot {
        if table_depth > 0 {
            if let Some(table_index) = self.tables.len().checked_sub(1) {
                let table = &mut self.tables[table_index];
                if let Some(row_index) = table.rows.len().checked_sub(1) {
                    let row = &mut table.rows[row_index];
                    if let Some(cell_index) = row.cells.len().checked_sub(1) {
                        let cell = &mut row.cells[cell_index];
                        cell.paragraphs.push(paragraph);
                        return Slot::Cell {
                            table: table_index,
                            row: row_index,
                            cell: cell_index,
                            paragraph: cell.paragraphs.len() - 1,
                        };
                    }
                }
            }
        }

        self.body.push(paragraph);
        Slot::Body(self.body.len() - 1)
    }

    fn paragraph(&self, slot: Slot) -> Option<&DocxParagraph> {
        match slot {
            Slot::Body(index) => self.body.get(index),
            Slot::Cell {
                table,
                row,
                cell,
                paragraph,
            } => self
                .tables
                .get(table)?
                .rows
                .get(row)?
                .cells
                .get(cell)?
                .paragraphs
                .get(paragraph),
        }
    }

    fn to_xml(&self) -> Result<Vec<u8>, DocumentError> {
        let mut writer = Writer::new(Vec::new());

        for node in &self.nodes {
            match node {
                Node::Markup(event) => write_event(&mut writer, event.clone())?,
                Node::Paragraph(slot) => {
                    let paragraph = self
                        .paragraph(*slot)
                        .ok_or_else(|| DocumentError::Xml("dangling paragraph slot".to_string()))?;
                    for event in paragraph.events() {
                        write_event(&mut writer, event)?;
                    }
                }
            }
        }

        Ok(writer.into_inner())
    }
}

impl DocumentModel for DocxDocument {
    type Paragraph = DocxParagraph;

    fn paragraphs(&self) -> &[DocxParagraph] {
        &self.body
    }

    fn paragraphs_mut(&mut self) -> &mut [DocxParagraph] {
        &mut self.body
    }

    fn tables(&self) -> &[Table<DocxParagraph>] {
        &self.tables
    }

    fn tables_mut(&mut self) -> &mut [Table<DocxParagraph>] {
        &mut self.tables
    }

    /// Written through a temporary file in the target directory, so a failure
    /// never leaves a truncated document behind.
    fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let bytes = self.to_bytes()?;
        let write_error = |source: std::io::Error| DocumentError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        file.write_all(&bytes).map_err(write_error)?;
        file.persist(path).map_err(|e| write_error(e.error))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Inline {
    Run(usize),
    Markup(Vec<XmlEvent>),
    /// A wrapper such as `w:hyperlink` or `w:ins`, kept around its runs.
    Container {
        start: XmlEvent,
        end: XmlEvent,
        children: Vec<Inline>,
    },
}

impl Inline {
    fn write_events(&self, runs: &[DocxRun], out: &mut Vec<XmlEvent>) {
        match self {
            Inline::Run(index) => {
                if let Some(run) = runs.get(*index) {
                    run.write_events(out);
                }
            }
            Inline::Markup(events) => out.extend(events.iter().cloned()),
            Inline::Container {
                start,
                end,
                children,
            } => {
                out.push(start.clone());
                for child in children {
                    child.write_events(runs, out);
                }
                out.push(end.clone());
            }
        }
    }
}

/// A `w:p` element.
///
/// Runs are collected in document order, including those nested in run
/// containers; `inlines` records where each one sits.
#[derive(Debug, Clone)]
pub struct DocxParagraph {
    start: BytesStart<'static>,
    properties: Vec<XmlEvent>,
    inlines: Vec<Inline>,
    runs: Vec<DocxRun>,
}

impl DocxParagraph {
    fn parse(start: BytesStart<'static>, children_events: &[XmlEvent]) -> Result<Self, DocumentError> {
        let mut paragraph = Self {
            start,
            properties: Vec::new(),
            inlines: Vec::new(),
            runs: Vec::new(),
        };

        for child in children(children_events) {
            match &child[0] {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == W_PPR => {
                    paragraph.properties.extend_from_slice(child);
                }
                _ => {
                    let inline = parse_inline(child, &mut paragraph.runs)?;
                    paragraph.inlines.push(inline);
                }
            }
        }

        Ok(paragraph)
    }

    fn events(&self) -> Vec<XmlEvent> {
        let mut out = vec![Event::Start(self.start.clone())];
        out.extend(self.properties.iter().cloned());

        for inline in &self.inlines {
            inline.write_events(&self.runs, &mut out);
        }

        out.push(Event::End(self.start.to_end().into_owned()));
        out
    }
}

fn parse_inline(element: &[XmlEvent], runs: &mut Vec<DocxRun>) -> Result<Inline, DocumentError> {
    match &element[0] {
        Event::Start(e) if e.name().as_ref() == W_R => {
            runs.push(DocxRun::parse(e.clone(), inner(element))?);
            Ok(Inline::Run(runs.len() - 1))
        }
        Event::Start(e) if element.len() >= 2 && RUN_CONTAINERS.contains(&e.name().as_ref()) => {
            let nested = children(inner(element))
                .into_iter()
                .map(|child| parse_inline(child, runs))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Inline::Container {
                start: element[0].clone(),
                end: element[element.len() - 1].clone(),
                children: nested,
            })
        }
        _ => Ok(Inline::Markup(element.to_vec())),
    }
}

impl ParagraphModel for DocxParagraph {
    type Run = DocxRun;

    fn runs(&self) -> &[DocxRun] {
        &self.runs
    }

    fn runs_mut(&mut self) -> &mut [DocxRun] {
        &mut self.runs
    }

    fn replace_content(&mut self, text: &str) {
        self.runs = vec![DocxRun::plain(text)];
        self.inlines = vec![Inline::Run(0)];
    }
}

#[derive(Debug, Clone)]
enum RunContent {
    Text(String),
    Tab,
    Break,
    Markup(Vec<XmlEvent>),
}

impl RunContent {
    fn is_textual(&self) -> bool {
        !matches!(self, RunContent::Markup(_))
    }
}

/// A `w:r` element.
#[derive(Debug, Clone)]
pub struct DocxRun {
    start: BytesStart<'static>,
    properties: Vec<XmlEvent>,
    content: Vec<RunContent>,
}

impl DocxRun {
    fn plain(text: &str) -> Self {
        Self {
            start: BytesStart::new("w:r"),
            properties: Vec::new(),
            content: text_content(text),
        }
    }

    fn parse(start: BytesStart<'static>, children_events: &[XmlEvent]) -> Result<Self, DocumentError> {
        let mut run = Self {
            start,
            properties: Vec::new(),
            content: Vec::new(),
        };

        for child in children(children_events) {
            let content = match &child[0] {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == W_RPR => {
                    run.properties.extend_from_slice(child);
                    continue;
                }
                Event::Start(e) if e.name().as_ref() == W_T => {
                    RunContent::Text(collect_text(inner(child))?)
                }
                Event::Empty(e) if e.name().as_ref() == W_T => RunContent::Text(String::new()),
                Event::Empty(e) if e.name().as_ref() == W_TAB => RunContent::Tab,
                Event::Empty(e) if e.name().as_ref() == W_CR => RunContent::Break,
                Event::Empty(e) if e.name().as_ref() == W_BR && is_text_wrapping(e) => {
                    RunContent::Break
                }
                _ => RunContent::Markup(child.to_vec()),
            };
            run.content.push(content);
        }

        Ok(run)
    }

    fn write_events(&self, out: &mut Vec<XmlEvent>) {
        out.push(Event::Start(self.start.clone()));
        out.extend(self.properties.iter().cloned());

        for piece in &self.content {
            match piece {
                RunContent::Text(text) => {
                    let mut t = BytesStart::new("w:t");
                    t.push_attribute(("xml:space", "preserve"));
                    out.push(Event::Start(t));
                    out.push(Event::Text(BytesText::new(text).into_owned()));
                    out.push(Event::End(BytesStart::new("w:t").to_end().into_owned()));
                }
                RunContent::Tab => out.push(Event::Empty(BytesStart::new("w:tab"))),
                RunContent::Break => out.push(Event::Empty(BytesStart::new("w:br"))),
                RunContent::Markup(events) => out.extend(events.iter().cloned()),
            }
        }

        out.push(Event::End(self.start.to_end().into_owned()));
    }
}

impl TextRun for DocxRun {
    fn text(&self) -> String {
        let mut text = String::new();
        for piece in &self.content {
            match piece {
                RunContent::Text(t) => text.push_str(t),
                RunContent::Tab => text.push('\t'),
                RunContent::Break => text.push('\n'),
                RunContent::Markup(_) => {}
            }
        }
        text
    }

    /// Textual pieces are replaced in place; drawings and other markup stay.
    fn set_text(&mut self, text: &str) {
        let at = self
            .content
            .iter()
            .position(RunContent::is_textual)
            .unwrap_or(self.content.len());
        self.content.retain(|piece| !piece.is_textual());
        let at = at.min(self.content.len());
        self.content.splice(at..at, text_content(text));
    }
}

fn text_content(text: &str) -> Vec<RunContent> {
    let mut content = Vec::new();
    let mut buffer = String::new();

    for c in text.chars() {
        match c {
            '\t' | '\n' => {
                if !buffer.is_empty() {
                    content.push(RunContent::Text(std::mem::take(&mut buffer)));
                }
                content.push(if c == '\t' {
                    RunContent::Tab
                } else {
                    RunContent::Break
                });
            }
            _ => buffer.push(c),
        }
    }

    if !buffer.is_empty() {
        content.push(RunContent::Text(buffer));
    }
    content
}

fn is_text_wrapping(e: &BytesStart<'_>) -> bool {
    match e.try_get_attribute("w:type") {
        Ok(Some(attr)) => attr.value.as_ref() == b"textWrapping",
        Ok(None) => true,
        Err(_) => false,
    }
}

fn collect_text(events: &[XmlEvent]) -> Result<String, DocumentError> {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) => {
                let unescaped = t.unescape().map_err(|e| DocumentError::Xml(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(data) => text.push_str(&String::from_utf8_lossy(data)),
            _ => {}
        }
    }
    Ok(text)
}

fn read_events(xml: &str) -> Result<Vec<XmlEvent>, DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut events = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => events.push(event.into_owned()),
            Err(e) => {
                return Err(DocumentError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(events)
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: XmlEvent) -> Result<(), DocumentError> {
    writer
        .write_event(event)
        .map_err(|e| DocumentError::Xml(e.to_string()))
}

/// Number of events making up the element that starts `events`.
fn subtree_len(events: &[XmlEvent]) -> usize {
    match events.first() {
        Some(Event::Start(_)) => {
            let mut depth = 0usize;
            for (i, event) in events.iter().enumerate() {
                match event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => {
                        depth -= 1;
                        if depth == 0 {
                            return i + 1;
                        }
                    }
                    _ => {}
                }
            }
            events.len()
        }
        Some(_) => 1,
        None => 0,
    }
}

/// Events between an element's start and end tags.
fn inner(element: &[XmlEvent]) -> &[XmlEvent] {
    if element.len() >= 2 {
        &element[1..element.len() - 1]
    } else {
        &[]
    }
}

/// Split a sequence of sibling events into one slice per child element.
fn children(events: &[XmlEvent]) -> Vec<&[XmlEvent]> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < events.len() {
        let len = subtree_len(&events[i..]).max(1);
        out.push(&events[i..i + len]);
        i += len;
    }
    out
}

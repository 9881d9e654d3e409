//! Orchestrator - runs the stages of a merge in order.
//!
//! This module contains:
//! - `summary` - the batch summary and its failure records
//! - `events` - progress events and the stop flag
//! - `worker` - runs a pipeline on a background task

pub mod events;
pub mod summary;
pub mod worker;

pub use events::{ProgressEvent, StopHandle};
pub use summary::{BatchSummary, DispatchTally, RecordFailure, SkipReason, Stage};
pub use worker::{spawn, PipelineWorker};

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{MailTransport, MergeConfig};
use crate::convert::{FormatConverter, Rasterizer, SofficeRasterizer};
use crate::document::common::today;
use crate::document::{DocumentRenderer, DocxTemplate, GeneratedDocument, RenderError, TemplateSource};
use crate::error::MergeError;
use crate::mail::{
    DesktopClientDispatcher, DispatchError, Dispatcher, MessageComposer, OutlookSession,
    SmtpDispatcher,
};
use crate::records::{read_records, Record, SourceError};
use crate::validation::{validate_email, validate_records, validate_template};

/// Message composition and the transport it goes through.
pub struct Mailer {
    pub composer: MessageComposer,
    pub dispatcher: Box<dyn Dispatcher>,
}

impl Mailer {
    pub fn new(composer: MessageComposer, dispatcher: Box<dyn Dispatcher>) -> Self {
        Self {
            composer,
            dispatcher,
        }
    }
}

/// Build the dispatcher selected by the configuration.
pub fn build_dispatcher(config: &MergeConfig) -> Result<Box<dyn Dispatcher>, DispatchError> {
    match config.mail.transport {
        MailTransport::Smtp => {
            let dispatcher = SmtpDispatcher::new(
                &config.smtp,
                config.mail.from_account.as_deref(),
                config.signature.load_project(),
                config.retry,
            )?;
            Ok(Box::new(dispatcher))
        }
        MailTransport::Desktop => Ok(Box::new(DesktopClientDispatcher::new(
            OutlookSession::new(&config.mail.outlook_shell),
            config.signature.clone(),
            config.retry,
        ))),
    }
}

/// One merge run over the configured input.
pub struct Pipeline<T: TemplateSource> {
    config: Arc<MergeConfig>,
    renderer: DocumentRenderer<T>,
    converter: FormatConverter,
    mailer: Option<Mailer>,
    events: Option<mpsc::Sender<ProgressEvent>>,
    stop: StopHandle,
    date: NaiveDate,
}

impl Pipeline<DocxTemplate> {
    /// DOCX template, office-suite converter, and the configured mail
    /// transport. A transport that cannot be built disables dispatch.
    pub fn from_config(config: Arc<MergeConfig>) -> Self {
        let template = DocxTemplate::new(&config.paths.template);
        let rasterizer = Box::new(SofficeRasterizer::new(&config.render.converter_bin));
        let mut pipeline = Self::new(config.clone(), template, rasterizer);

        if !config.mail.send_email {
            log::info!("Mail dispatch disabled");
            return pipeline;
        }

        match build_dispatcher(&config) {
            Ok(dispatcher) => {
                log::info!("Mail transport: {}", dispatcher.name());
                pipeline.mailer = Some(Mailer::new(
                    MessageComposer::from_config(&config.mail),
                    dispatcher,
                ));
            }
            Err(e) => log::error!("Mail dispatch disabled: {}", e),
        }
        pipeline
    }
}

impl<T: TemplateSource> Pipeline<T> {
    pub fn new(config: Arc<MergeConfig>, template: T, rasterizer: Box<dyn Rasterizer>) -> Self {
        let renderer = DocumentRenderer::new(
            template,
            config.render.placeholder.clone(),
            config.paths.docx_dir.clone(),
            config.render.numbered,
        );
        let converter = FormatConverter::new(rasterizer, config.paths.pdf_dir.clone());

        Self {
            config,
            renderer,
            converter,
            mailer: None,
            events: None,
            stop: StopHandle::new(),
            date: today(),
        }
    }

    pub fn with_mailer(mut self, mailer: Mailer) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Date used for `{{DATE_SOUMISSION}}`.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Run every stage and return the summary.
    ///
    /// Only batch-wide problems are errors; per-record failures end up in the
    /// summary.
    pub async fn run(&self) -> Result<BatchSummary, MergeError> {
        let paths = &self.config.paths;

        validate_template(self.renderer.template().path())?;
        if !paths.input.is_file() {
            return Err(SourceError::MissingInput {
                path: paths.input.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            }
            .into());
        }
        create_dir(&paths.docx_dir)?;
        create_dir(&paths.pdf_dir)?;

        let set = read_records(&paths.input)?;
        if set.is_empty() {
            log::error!("No valid row in {}", paths.input.display());
            return Err(MergeError::NoValidRecords);
        }
        log::info!("{} record(s) read from {}", set.len(), paths.input.display());

        for issue in validate_records(&set.records).iter() {
            log::warn!("{}", issue);
        }

        let mut summary = BatchSummary::new(set.total_rows, set.len());
        self.emit(ProgressEvent::Started {
            records: summary.records,
            input_rows: summary.input_rows,
        })
        .await;

        let pdfs = self.generate(&set.records, &mut summary).await?;
        if summary.generated == 0 && !summary.stopped {
            log::error!("No document generated");
            return Err(MergeError::NoDocumentsGenerated);
        }

        if let Some(mailer) = &self.mailer {
            summary.dispatch.enabled = true;
            if !summary.stopped {
                self.dispatch(mailer, &set.records, &pdfs, &mut summary).await;
            }
        }

        summary.log();
        self.emit(ProgressEvent::Finished {
            summary: summary.clone(),
        })
        .await;
        Ok(summary)
    }

    /// Render and convert each record. Returns the PDF of each record, by
    /// position.
    async fn generate(
        &self,
        records: &[Record],
        summary: &mut BatchSummary,
    ) -> Result<Vec<Option<PathBuf>>, MergeError> {
        let mut pdfs = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let sequence = index + 1;
            if self.stop.is_stopped() {
                log::warn!("Stop requested, {} record(s) not generated", records.len() - index);
                summary.stopped = true;
                self.emit(ProgressEvent::Stopped { sequence }).await;
                break;
            }

            let document = match self.render_with_retries(record, sequence) {
                Ok(document) => document,
                Err(e) => {
                    log::error!("{}", e);
                    self.record_failure(summary, record, sequence, Stage::Render, e.to_string())
                        .await;
                    pdfs.push(None);
                    continue;
                }
            };
            summary.generated += 1;
            self.emit(ProgressEvent::Generated {
                sequence,
                path: document.path.clone(),
            })
            .await;

            match self.converter.convert(&document.path, record) {
                Ok(pdf) => {
                    summary.rendered += 1;
                    self.emit(ProgressEvent::Rendered {
                        sequence,
                        path: pdf.clone(),
                    })
                    .await;
                    pdfs.push(Some(pdf));
                }
                Err(e) if e.is_environment() => {
                    log::error!("{}", e);
                    return Err(MergeError::ConversionEnvironment(e));
                }
                Err(e) => {
                    log::error!("PDF conversion failed for '{}': {}", record.name, e);
                    self.record_failure(summary, record, sequence, Stage::Convert, e.to_string())
                        .await;
                    pdfs.push(None);
                }
            }
        }

        Ok(pdfs)
    }

    fn render_with_retries(&self, record: &Record, sequence: usize) -> Result<GeneratedDocument, RenderError> {
        let attempts = self.config.render.render_retries + 1;
        let mut attempt = 1;
        loop {
            match self.renderer.render(record, sequence) {
                Ok(document) => return Ok(document),
                Err(e) if attempt < attempts => {
                    log::warn!("Render attempt {}/{} failed: {}", attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch(
        &self,
        mailer: &Mailer,
        records: &[Record],
        pdfs: &[Option<PathBuf>],
        summary: &mut BatchSummary,
    ) {
        if let Err(e) = mailer.dispatcher.prepare().await {
            log::error!("Mail transport not ready: {}", e);
        }

        for (index, record) in records.iter().enumerate() {
            let sequence = index + 1;
            if self.stop.is_stopped() {
                log::warn!("Stop requested, {} mail(s) not sent", records.len() - index);
                summary.stopped = true;
                self.emit(ProgressEvent::Stopped { sequence }).await;
                break;
            }

            let pdf = pdfs.get(index).and_then(Option::as_ref);
            let skip = if !record.has_email() {
                Some(SkipReason::NoEmail)
            } else if !validate_email(&record.email) {
                Some(SkipReason::InvalidEmail)
            } else if pdf.is_none() {
                Some(SkipReason::NoAttachment)
            } else {
                None
            };

            let Some(pdf) = pdf.filter(|_| skip.is_none()) else {
                let reason = skip.unwrap_or(SkipReason::NoAttachment);
                log::info!("Mail skipped for #{} {}: {}", sequence, record.name, reason);
                summary.dispatch.skipped += 1;
                self.emit(ProgressEvent::Skipped { sequence, reason }).await;
                continue;
            };

            summary.dispatch.attempted += 1;
            let mail = mailer.composer.compose(record, vec![pdf.clone()], self.date);
            match mailer.dispatcher.send(&mail).await {
                Ok(()) => {
                    summary.dispatch.sent += 1;
                    self.emit(ProgressEvent::Sent {
                        sequence,
                        to: record.email.clone(),
                    })
                    .await;
                }
                Err(e) => {
                    log::error!("Mail to {} failed: {}", record.email, e);
                    summary.dispatch.failed += 1;
                    self.record_failure(summary, record, sequence, Stage::Dispatch, e.to_string())
                        .await;
                }
            }
        }

        log::info!("Mails sent: {}/{}", summary.dispatch.sent, records.len());
    }

    async fn record_failure(
        &self,
        summary: &mut BatchSummary,
        record: &Record,
        sequence: usize,
        stage: Stage,
        reason: String,
    ) {
        summary.fail(sequence, &record.name, stage, reason.clone());
        self.emit(ProgressEvent::Failed {
            sequence,
            stage,
            reason,
        })
        .await;
    }

    async fn emit(&self, event: ProgressEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                log::debug!("Progress receiver dropped");
            }
        }
    }
}

fn create_dir(path: &Path) -> Result<(), MergeError> {
    fs::create_dir_all(path).map_err(|source| MergeError::OutputDir {
        path: path.to_path_buf(),
        source,
    })
}

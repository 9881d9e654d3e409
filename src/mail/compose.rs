//! Subject and body composition.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use super::OutgoingMail;
use crate::config::MailConfig;
use crate::document::common::format_submission_date;
use crate::records::{read_text_file, Record};

const NAME_FIELD: &str = "{nom}";
const DATE_FIELD: &str = "{{DATE_SOUMISSION}}";

/// Builds the [`OutgoingMail`] of each record.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    subject_template: String,
    fallback_body: String,
    email_template: Option<String>,
    from_account: Option<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
}

impl MessageComposer {
    pub fn new(subject_template: impl Into<String>, fallback_body: impl Into<String>) -> Self {
        Self {
            subject_template: subject_template.into(),
            fallback_body: fallback_body.into(),
            email_template: None,
            from_account: None,
            cc: Vec::new(),
            bcc: Vec::new(),
        }
    }

    /// Composer for a run; the HTML template is read once here.
    pub fn from_config(config: &MailConfig) -> Self {
        let mut composer = Self::new(&config.subject_template, &config.fallback_body_html)
            .with_envelope(config.from_account.clone(), config.cc.clone(), config.bcc.clone());

        if config.use_email_template {
            composer.email_template = load_email_template(&config.email_template_file);
        }
        composer
    }

    pub fn with_template_html(mut self, html: impl Into<String>) -> Self {
        self.email_template = Some(html.into());
        self
    }

    pub fn with_envelope(mut self, from_account: Option<String>, cc: Vec<String>, bcc: Vec<String>) -> Self {
        self.from_account = from_account;
        self.cc = cc;
        self.bcc = bcc;
        self
    }

    pub fn subject(&self, name: &str) -> String {
        self.subject_template.replace(NAME_FIELD, name)
    }

    /// The HTML template with the submission date filled in when one is
    /// loaded, otherwise the fallback body with the name filled in.
    pub fn body(&self, name: &str, date: NaiveDate) -> String {
        match &self.email_template {
            Some(html) => html.replace(DATE_FIELD, &format_submission_date(date)),
            None => self.fallback_body.replace(NAME_FIELD, name),
        }
    }

    pub fn compose(&self, record: &Record, attachments: Vec<PathBuf>, date: NaiveDate) -> OutgoingMail {
        OutgoingMail {
            to: record.email.clone(),
            subject: self.subject(&record.name),
            html_body: self.body(&record.name, date),
            attachments,
            from_account: self.from_account.clone(),
            cc: self.cc.clone(),
            bcc: self.bcc.clone(),
        }
    }
}

fn load_email_template(path: &Path) -> Option<String> {
    if !path.is_file() {
        log::warn!("Email template not found: {}, using fallback body", path.display());
        return None;
    }

    match read_text_file(path) {
        Ok(html) => {
            log::debug!("Email template loaded from {}", path.display());
            Some(html)
        }
        Err(e) => {
            log::warn!("Failed to read email template {}: {}", path.display(), e);
            None
        }
    }
}

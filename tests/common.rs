//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use publipostage::convert::{ConversionError, Rasterizer};
use publipostage::document::{DocumentError, DocxDocument, DocxTemplate, TemplateSource};
use publipostage::mail::desktop::{Envelope, MessageId};
use publipostage::mail::{DispatchError, Dispatcher, MailSession, OutgoingMail, SessionError};
use publipostage::pipeline::StopHandle;
use publipostage::MergeConfig;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const TRANSIENT: &str = "(-2147418111, 'Call was rejected by callee.')";

/// A minimal DOCX archive whose body is `body`.
pub fn docx_bytes(body: &str) -> Vec<u8> {
    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            r#"<w:body>{}</w:body></w:document>"#
        ),
        body
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer.write_all(b"<Types/>").unwrap();
    writer.start_file("word/styles.xml", options).unwrap();
    writer.write_all(b"<w:styles/>").unwrap();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Template with the placeholder split over two runs in the body and whole in
/// a table cell.
pub const MERGE_BODY: &str = concat!(
    r#"<w:p><w:r><w:t xml:space="preserve">Entreprise : </w:t></w:r>"#,
    r#"<w:r><w:rPr><w:b/></w:rPr><w:t>{{VEN</w:t></w:r>"#,
    r#"<w:r><w:t>DEUR}}</w:t></w:r></w:p>"#,
    r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Vendeur</w:t></w:r></w:p></w:tc>"#,
    r#"<w:tc><w:p><w:r><w:t>{{VENDEUR}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
);

pub fn write_template(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("modele.docx");
    fs::write(&path, docx_bytes(body)).unwrap();
    path
}

pub fn write_csv(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("entrepreneurs.csv");
    fs::write(&path, content).unwrap();
    path
}

/// Configuration rooted in `dir`, no log file, no sleep between retries.
pub fn test_config(dir: &Path, overrides: &[(&str, &str)]) -> MergeConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
    vars.insert("TEMPLATE_PATH".into(), path("modele.docx"));
    vars.insert("INPUT_CSV".into(), path("entrepreneurs.csv"));
    vars.insert("OUTPUT_DOCX_DIR".into(), path("out/docx"));
    vars.insert("OUTPUT_PDF_DIR".into(), path("out/pdf"));
    vars.insert("SIGNATURES_DIR".into(), path("signatures"));
    vars.insert("PROJECT_SIGNATURE_FILE".into(), path("signature.html"));
    vars.insert("EMAIL_TEMPLATE_FILE".into(), path("email.html"));
    vars.insert("LOG_FILE".into(), String::new());
    vars.insert("DELAY_SECONDS".into(), "0".into());
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    MergeConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// DOCX template whose first loads fail.
#[derive(Debug)]
pub struct FlakyTemplate {
    pub inner: DocxTemplate,
    /// Loads left to fail.
    pub failures: AtomicU32,
    pub loads: Arc<AtomicU32>,
}

impl FlakyTemplate {
    pub fn new(path: &Path, failures: u32) -> Self {
        Self {
            inner: DocxTemplate::new(path),
            failures: AtomicU32::new(failures),
            loads: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl TemplateSource for FlakyTemplate {
    type Document = DocxDocument;

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn load(&self) -> Result<DocxDocument, DocumentError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if FakeSession::take_failure(&self.failures) {
            return Err(DocumentError::TemplateIo {
                path: self.inner.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "template locked"),
            });
        }
        self.inner.load()
    }
}

/// Writes a fake PDF next to where the real converter would.
#[derive(Debug, Default)]
pub struct FakeRasterizer {
    /// Behave as if the converter program were not installed.
    pub missing_program: bool,
    /// Fail for inputs whose file name contains this text.
    pub fail_for: Option<String>,
    pub calls: Arc<AtomicU32>,
    /// Requested to stop once a PDF has been written.
    pub stop: Option<StopHandle>,
}

impl FakeRasterizer {
    pub fn missing() -> Self {
        Self {
            missing_program: true,
            ..Self::default()
        }
    }

    pub fn failing_for(name: &str) -> Self {
        Self {
            fail_for: Some(name.to_string()),
            ..Self::default()
        }
    }
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_program {
            return Err(ConversionError::Environment {
                program: "soffice".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }

        let file_name = input.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_for.as_deref().is_some_and(|name| file_name.contains(name)) {
            return Err(ConversionError::Failed {
                input: input.to_path_buf(),
                reason: "conversion crashed".to_string(),
            });
        }

        fs::write(output, b"%PDF-1.4\n").unwrap();
        if let Some(stop) = &self.stop {
            stop.stop();
        }
        Ok(())
    }
}

/// Keeps every message it is asked to send.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    pub sent: Arc<Mutex<Vec<OutgoingMail>>>,
    /// Recipients for which sending fails.
    pub reject: Vec<String>,
    /// Requested to stop once a message has been sent.
    pub stop: Option<StopHandle>,
}

impl RecordingDispatcher {
    pub fn messages(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), DispatchError> {
        if self.reject.contains(&mail.to) {
            return Err(DispatchError::Smtp("550 mailbox unavailable".to_string()));
        }
        self.sent.lock().push(mail.clone());
        if let Some(stop) = &self.stop {
            stop.stop();
        }
        Ok(())
    }
}

/// In-memory mail client.
#[derive(Debug, Default)]
pub struct FakeSession {
    pub calls: Mutex<Vec<String>>,
    /// Transient failures left before `send` succeeds.
    pub send_failures: AtomicU32,
    /// Failure returned by every `send`, never retried.
    pub send_error: Option<String>,
    pub create_failures: AtomicU32,
    pub envelopes: Mutex<Vec<Envelope>>,
    pub bodies: Mutex<Vec<String>>,
    /// `(path, content id)` of every attachment.
    pub attachments: Mutex<Vec<(PathBuf, Option<String>)>>,
    pub known_accounts: Vec<String>,
    /// Name reported as the client default signature.
    pub default_signature: Option<String>,
}

impl FakeSession {
    pub fn with_send_failures(count: u32) -> Self {
        Self {
            send_failures: AtomicU32::new(count),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn call(&self, name: &str) {
        self.calls.lock().push(name.to_string());
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MailSession for FakeSession {
    async fn ensure_ready(&self) -> Result<(), SessionError> {
        self.call("ensure_ready");
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<(String, String)>, SessionError> {
        self.call("accounts");
        Ok(self
            .known_accounts
            .iter()
            .map(|address| (address.clone(), address.clone()))
            .collect())
    }

    async fn create_message(&self) -> Result<MessageId, SessionError> {
        self.call("create_message");
        if Self::take_failure(&self.create_failures) {
            return Err(SessionError::new("create message", TRANSIENT));
        }
        Ok(MessageId("msg-1".to_string()))
    }

    async fn select_account(&self, _message: &MessageId, address: &str) -> Result<bool, SessionError> {
        self.call("select_account");
        Ok(self.known_accounts.iter().any(|a| a == address))
    }

    async fn set_envelope(&self, _message: &MessageId, envelope: &Envelope) -> Result<(), SessionError> {
        self.call("set_envelope");
        self.envelopes.lock().push(envelope.clone());
        Ok(())
    }

    async fn set_html_body(&self, _message: &MessageId, html: &str) -> Result<(), SessionError> {
        self.call("set_html_body");
        self.bodies.lock().push(html.to_string());
        Ok(())
    }

    async fn attach(
        &self,
        _message: &MessageId,
        path: &Path,
        content_id: Option<&str>,
    ) -> Result<(), SessionError> {
        self.call("attach");
        self.attachments
            .lock()
            .push((path.to_path_buf(), content_id.map(str::to_string)));
        Ok(())
    }

    async fn save(&self, _message: &MessageId) -> Result<(), SessionError> {
        self.call("save");
        Ok(())
    }

    async fn send(&self, _message: &MessageId) -> Result<(), SessionError> {
        self.call("send");
        if let Some(message) = &self.send_error {
            return Err(SessionError::new("send", message.clone()));
        }
        if Self::take_failure(&self.send_failures) {
            return Err(SessionError::new("send", TRANSIENT));
        }
        Ok(())
    }

    async fn default_signature_name(&self) -> Result<Option<String>, SessionError> {
        self.call("default_signature_name");
        Ok(self.default_signature.clone())
    }
}

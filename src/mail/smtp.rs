//! Direct SMTP dispatch using lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::PathBuf;

use super::retry::{retry_when, RetryPolicy};
use super::{DispatchError, Dispatcher, OutgoingMail};
use crate::config::{SmtpConfig, TlsMode};

/// A file read into memory, ready to attach.
#[derive(Debug, Clone)]
pub struct LoadedAttachment {
    pub file_name: String,
    pub content: Vec<u8>,
    pub content_type: ContentType,
}

impl LoadedAttachment {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = mime_guess::from_path(&file_name).first_or_octet_stream();
        let content_type = ContentType::parse(mime.essence_str()).unwrap_or(ContentType::TEXT_PLAIN);
        Self {
            file_name,
            content,
            content_type,
        }
    }
}

/// Sends each message over one reused SMTP transport.
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
    signature_html: Option<String>,
    retry: RetryPolicy,
}

impl SmtpDispatcher {
    /// Build the transport. Fails when the host, user or password is missing.
    pub fn new(
        config: &SmtpConfig,
        from_account: Option<&str>,
        signature_html: Option<String>,
        retry: RetryPolicy,
    ) -> Result<Self, DispatchError> {
        let host = config
            .host
            .clone()
            .ok_or(DispatchError::MissingConfig("SMTP_HOST"))?;
        let username = config
            .username
            .clone()
            .ok_or(DispatchError::MissingConfig("SMTP_USERNAME"))?;
        let password = config
            .password
            .clone()
            .ok_or(DispatchError::MissingConfig("SMTP_PASSWORD"))?;

        let sender = from_account.unwrap_or(&username);
        let from: Mailbox = sender.parse().map_err(|e| DispatchError::InvalidAddress {
            address: sender.to_string(),
            reason: format!("{}", e),
        })?;

        let builder = match config.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .map_err(|e| DispatchError::Smtp(e.to_string()))?,
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                .map_err(|e| DispatchError::Smtp(e.to_string()))?,
        };

        let transport = builder
            .port(config.port)
            .timeout(Some(config.timeout))
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self {
            transport,
            from,
            host,
            signature_html,
            retry,
        })
    }

    /// Connect and authenticate without sending anything.
    pub async fn test_connection(&self) -> Result<bool, DispatchError> {
        let ok = self
            .transport
            .test_connection()
            .await
            .map_err(|e| DispatchError::Smtp(e.to_string()))?;

        if ok {
            log::info!("SMTP connection to {} succeeded", self.host);
        } else {
            log::error!("SMTP connection to {} failed", self.host);
        }
        Ok(ok)
    }

    /// Build the multipart message: HTML part (signature appended) then attachments.
    pub fn build_message(
        &self,
        mail: &OutgoingMail,
        attachments: Vec<LoadedAttachment>,
    ) -> Result<Message, DispatchError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&mail.to)?);

        for cc in &mail.cc {
            builder = builder.cc(parse_mailbox(cc)?);
        }
        for bcc in &mail.bcc {
            builder = builder.bcc(parse_mailbox(bcc)?);
        }

        let mut html = mail.html_body.clone();
        if let Some(signature) = &self.signature_html {
            html.push_str(signature);
        }

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::html(html));
        for attachment in attachments {
            multipart = multipart.singlepart(
                Attachment::new(attachment.file_name).body(attachment.content, attachment.content_type),
            );
        }

        builder
            .subject(&mail.subject)
            .multipart(multipart)
            .map_err(|e| DispatchError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DispatchError> {
    address.parse().map_err(|e| DispatchError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{}", e),
    })
}

/// Read attachments; unreadable files are skipped with a warning.
async fn load_attachments(paths: &[PathBuf]) -> Vec<LoadedAttachment> {
    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "piece-jointe".to_string());

        match tokio::fs::read(path).await {
            Ok(content) => {
                log::debug!("Attached {}", path.display());
                loaded.push(LoadedAttachment::new(file_name, content));
            }
            Err(e) => log::warn!("Cannot attach {}: {}", path.display(), e),
        }
    }
    loaded
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), DispatchError> {
        let attachments = load_attachments(&mail.attachments).await;
        let message = self.build_message(mail, attachments)?;
        let transport = &self.transport;

        retry_when(&self.retry, "SMTP send", |_| true, move |_| transport.send(message.clone()))
            .await
            .map_err(|failure| DispatchError::exhausted(&mail.to, failure))?;

        log::info!("Mail sent to {} via SMTP", mail.to);
        Ok(())
    }
}

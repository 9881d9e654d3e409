//! Desktop mail-client dispatch.
//!
//! The client is reached through a [`MailSession`], a narrow view of its
//! automation interface. The client may refuse calls while busy; those
//! refusals are transient and retried, anything else propagates at once.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::retry::{retry_when, RetryPolicy};
use super::signature::{rewrite_image_sources, Signature, SignatureChoice, SignatureOptions};
use super::{DispatchError, Dispatcher, OutgoingMail};

/// Error texts of a busy automation server.
pub const TRANSIENT_MARKERS: [&str; 4] = [
    "Call was rejected by callee",
    "-2147418111",
    "0x80010001",
    "RPC_E_CALL_REJECTED",
];

#[derive(Debug, Clone, Error)]
#[error("{operation}: {message}")]
pub struct SessionError {
    pub operation: String,
    pub message: String,
}

impl SessionError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        TRANSIENT_MARKERS.iter().any(|marker| self.message.contains(marker))
    }
}

/// Identifier of a message item inside the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

/// Recipients and subject as the client expects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: String,
    /// `; ` separated, empty when none.
    pub cc: String,
    pub bcc: String,
    pub subject: String,
}

impl Envelope {
    pub fn of(mail: &OutgoingMail) -> Self {
        Self {
            to: mail.to.clone(),
            cc: mail.cc.join("; "),
            bcc: mail.bcc.join("; "),
            subject: mail.subject.clone(),
        }
    }
}

/// Automation surface of a desktop mail client.
#[async_trait]
pub trait MailSession: Send + Sync {
    /// Start or attach to the client and log on. Idempotent.
    async fn ensure_ready(&self) -> Result<(), SessionError>;

    /// Accounts configured in the client, as `(display name, address)`.
    async fn accounts(&self) -> Result<Vec<(String, String)>, SessionError>;

    async fn create_message(&self) -> Result<MessageId, SessionError>;

    /// Send with the account whose address matches; `false` when none does.
    async fn select_account(&self, message: &MessageId, address: &str) -> Result<bool, SessionError>;

    async fn set_envelope(&self, message: &MessageId, envelope: &Envelope) -> Result<(), SessionError>;

    async fn set_html_body(&self, message: &MessageId, html: &str) -> Result<(), SessionError>;

    /// Attach a file, as an inline resource when `content_id` is given.
    async fn attach(
        &self,
        message: &MessageId,
        path: &Path,
        content_id: Option<&str>,
    ) -> Result<(), SessionError>;

    async fn save(&self, message: &MessageId) -> Result<(), SessionError>;

    async fn send(&self, message: &MessageId) -> Result<(), SessionError>;

    /// Name of the signature the client adds to new messages, if any.
    async fn default_signature_name(&self) -> Result<Option<String>, SessionError> {
        Ok(None)
    }
}

/// Dispatches through a desktop client session.
pub struct DesktopClientDispatcher<S: MailSession> {
    session: S,
    signature: SignatureOptions,
    retry: RetryPolicy,
    default_signature: OnceCell<Option<String>>,
}

impl<S: MailSession> DesktopClientDispatcher<S> {
    pub fn new(session: S, signature: SignatureOptions, retry: RetryPolicy) -> Self {
        Self {
            session,
            signature,
            retry,
            default_signature: OnceCell::new(),
        }
    }

    /// Asked once per dispatcher, and only for the client default choice.
    async fn load_signature(&self) -> Option<Signature> {
        if self.signature.choice() != SignatureChoice::SystemDefault {
            return self.signature.load();
        }

        let name = self
            .default_signature
            .get_or_init(|| async {
                match self.session.default_signature_name().await {
                    Ok(name) => name,
                    Err(e) => {
                        log::warn!("Cannot read the client default signature: {}", e);
                        None
                    }
                }
            })
            .await;
        self.signature.load_with_default(name.as_deref())
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Body followed by the selected signature, its images attached when
    /// embedding is enabled.
    async fn body_with_signature(&self, message: &MessageId, body: &str) -> String {
        let Some(signature) = self.load_signature().await else {
            log::debug!("No signature loaded");
            return body.to_string();
        };

        let mut html = signature.html.clone();
        if self.signature.embed_images {
            let mut attached = Vec::new();
            for image in signature.images() {
                match self
                    .session
                    .attach(message, &image.path, Some(image.content_id.as_str()))
                    .await
                {
                    Ok(()) => attached.push(image),
                    Err(e) => log::debug!("Signature image {} not attached: {}", image.path.display(), e),
                }
            }
            html = rewrite_image_sources(&html, &attached);
        }

        log::debug!("Signature added: {}", signature.name);
        format!("{}{}", body, html)
    }
}

#[async_trait]
impl<S: MailSession> Dispatcher for DesktopClientDispatcher<S> {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn prepare(&self) -> Result<(), DispatchError> {
        self.session.ensure_ready().await?;

        match self.session.accounts().await {
            Ok(accounts) => {
                log::info!("Mail client accounts:");
                for (name, address) in accounts {
                    log::info!(" - {} <{}>", name, address);
                }
            }
            Err(e) => log::error!("Failed to list mail client accounts: {}", e),
        }
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), DispatchError> {
        log::info!(
            "Preparing mail to={} from={} subject={}",
            mail.to,
            mail.from_account.as_deref().unwrap_or("(default)"),
            mail.subject
        );

        let session = &self.session;
        session.ensure_ready().await?;

        let message = retry_when(&self.retry, "create message", SessionError::is_transient, move |_| {
            session.create_message()
        })
        .await
        .map_err(|failure| retry_failure(&mail.to, failure))?;

        if let Some(account) = mail.from_account.as_deref().filter(|a| !a.is_empty()) {
            match session.select_account(&message, account).await {
                Ok(true) => log::info!("Sending with account {}", account),
                Ok(false) => log::warn!("Account '{}' not found in the mail client", account),
                Err(e) => log::warn!("Cannot select account '{}': {}", account, e),
            }
        }

        session.set_envelope(&message, &Envelope::of(mail)).await?;

        let html = self.body_with_signature(&message, &mail.html_body).await;
        session.set_html_body(&message, &html).await?;

        for path in &mail.attachments {
            match session.attach(&message, path, None).await {
                Ok(()) => log::debug!("Attached {}", path.display()),
                Err(e) => log::warn!("Cannot attach {}: {}", path.display(), e),
            }
        }

        if let Err(e) = session.save(&message).await {
            log::debug!("Draft save failed (ignored): {}", e);
        }

        let message = &message;
        retry_when(&self.retry, "send", SessionError::is_transient, move |_| {
            session.send(message)
        })
        .await
        .map_err(|failure| retry_failure(&mail.to, failure))?;

        log::info!("Mail sent to {}", mail.to);
        Ok(())
    }
}

fn retry_failure(recipient: &str, failure: super::RetryError<SessionError>) -> DispatchError {
    match failure {
        super::RetryError::Aborted { error, .. } => DispatchError::Session(error),
        exhausted => DispatchError::exhausted(recipient, exhausted),
    }
}

//! Mail dispatch - one contract, two strategies.
//!
//! This module contains:
//! - `retry` - bounded retry helper shared by both strategies
//! - `compose` - subject and body of each message
//! - `signature` - signature selection and inline images
//! - `smtp` - direct SMTP through lettre
//! - `desktop` - desktop mail-client automation over a [`desktop::MailSession`]
//! - `outlook` - the Outlook session, driven through PowerShell

pub mod compose;
pub mod desktop;
pub mod outlook;
pub mod retry;
pub mod signature;
pub mod smtp;

pub use compose::MessageComposer;
pub use desktop::{DesktopClientDispatcher, MailSession, SessionError};
pub use outlook::OutlookSession;
pub use retry::{retry_when, RetryError, RetryPolicy};
pub use signature::{SignatureChoice, SignatureOptions};
pub use smtp::SmtpDispatcher;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// A message ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<PathBuf>,
    pub from_account: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// A mail-client failure that is not worth retrying.
    #[error("mail client error: {0}")]
    Session(#[from] SessionError),
    #[error("sending to {recipient} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        recipient: String,
        attempts: u32,
        last_error: String,
    },
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("mail configuration incomplete: {0}")]
    MissingConfig(&'static str),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("SMTP error: {0}")]
    Smtp(String),
}

impl DispatchError {
    pub fn exhausted(recipient: &str, failure: RetryError<impl std::fmt::Display>) -> Self {
        Self::Exhausted {
            recipient: recipient.to_string(),
            attempts: failure.attempts(),
            last_error: failure.into_error().to_string(),
        }
    }
}

/// Sends composed messages.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Called once before the first message of a batch.
    async fn prepare(&self) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), DispatchError>;
}

//! publipostage - mail-merge of a DOCX template, PDF conversion and email
//! dispatch, one document per row of an input table.

pub mod cli;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod logging;
pub mod mail;
pub mod pipeline;
pub mod records;
pub mod validation;

pub use crate::config::MergeConfig;
pub use crate::error::MergeError;
pub use crate::pipeline::{BatchSummary, Pipeline};

use clap::Parser;

/// Parse the command line, run it, and return the process exit code.
pub async fn run() -> i32 {
    cli::execute(cli::Cli::parse()).await
}

//! Command-line front end.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{MailTransport, MergeConfig};
use crate::logging;
use crate::mail::signature::list_signatures;
use crate::mail::SmtpDispatcher;
use crate::pipeline::{self, Pipeline};

#[derive(Debug, Parser)]
#[command(name = "publipostage", version, about = "Mail-merge a DOCX template, convert to PDF and send by email")]
pub struct Cli {
    /// Load variables from this file instead of `.env`.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[arg(long, global = true)]
    pub template: Option<PathBuf>,

    /// Input table (CSV with `nom` and `email` columns).
    #[arg(long, global = true)]
    pub input: Option<PathBuf>,

    #[arg(long, global = true)]
    pub docx_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub pdf_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub placeholder: Option<String>,

    /// Generate documents only.
    #[arg(long, global = true)]
    pub no_mail: bool,

    #[arg(long, global = true, value_enum)]
    pub transport: Option<TransportArg>,

    /// Write the batch summary as JSON to this file.
    #[arg(long, global = true)]
    pub summary_json: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the merge (default).
    Run,
    /// Connect and authenticate to the SMTP server.
    CheckSmtp,
    /// List the mail-client signatures.
    ListSignatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Smtp,
    Desktop,
}

impl From<TransportArg> for MailTransport {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Smtp => MailTransport::Smtp,
            TransportArg::Desktop => MailTransport::Desktop,
        }
    }
}

impl Cli {
    /// Command-line values win over the environment.
    pub fn apply(&self, config: &mut MergeConfig) {
        if let Some(template) = &self.template {
            config.paths.template = template.clone();
        }
        if let Some(input) = &self.input {
            config.paths.input = input.clone();
        }
        if let Some(dir) = &self.docx_dir {
            config.paths.docx_dir = dir.clone();
        }
        if let Some(dir) = &self.pdf_dir {
            config.paths.pdf_dir = dir.clone();
        }
        if let Some(placeholder) = &self.placeholder {
            config.render.placeholder = placeholder.clone();
        }
        if self.no_mail {
            config.mail.send_email = false;
        }
        if let Some(transport) = self.transport {
            config.mail.transport = transport.into();
        }
    }
}

/// Load configuration, set up logging and run the selected command.
/// Returns the process exit code.
pub async fn execute(cli: Cli) -> i32 {
    match &cli.env_file {
        Some(path) => {
            if let Err(e) = dotenvy::from_path(path) {
                eprintln!("Cannot load {}: {}", path.display(), e);
                return 1;
            }
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let mut config = match MergeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return 1;
        }
    };
    cli.apply(&mut config);

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{}", e);
        return 1;
    }

    let config = Arc::new(config);
    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => return run_merge(config, cli.summary_json).await,
        Command::CheckSmtp => check_smtp(&config).await,
        Command::ListSignatures => print_signatures(&config),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    }
}

async fn run_merge(config: Arc<MergeConfig>, summary_json: Option<PathBuf>) -> i32 {
    log::info!(
        "Merging {} into {} with template {}",
        config.paths.input.display(),
        config.paths.docx_dir.display(),
        config.paths.template.display()
    );

    let mut worker = pipeline::spawn(Pipeline::from_config(config), pipeline::worker::DEFAULT_EVENT_CAPACITY);

    let stop = worker.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current record");
            stop.stop();
        }
    });

    while let Some(event) = worker.next_event().await {
        if let Ok(json) = serde_json::to_string(&event) {
            log::debug!("event {}", json);
        }
    }

    match worker.join().await {
        Ok(summary) => {
            if let Some(path) = summary_json {
                match summary.write_json(&path) {
                    Ok(()) => log::info!("Summary written to {}", path.display()),
                    Err(e) => log::error!("Cannot write summary {}: {}", path.display(), e),
                }
            }
            0
        }
        Err(e) => {
            log::error!("{}", e);
            e.exit_code()
        }
    }
}

async fn check_smtp(config: &MergeConfig) -> anyhow::Result<()> {
    let dispatcher = SmtpDispatcher::new(
        &config.smtp,
        config.mail.from_account.as_deref(),
        None,
        config.retry,
    )
    .context("SMTP configuration")?;

    let ok = dispatcher
        .test_connection()
        .await
        .context("SMTP connection test")?;
    if !ok {
        bail!("SMTP server refused the connection");
    }
    Ok(())
}

fn print_signatures(config: &MergeConfig) -> anyhow::Result<()> {
    let dir = &config.signature.signatures_dir;
    let names = list_signatures(dir);
    if names.is_empty() {
        log::info!("No signature found in {}", dir.display());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

//! Logger set-up: env_logger writing to stderr and an optional log file.

use chrono::Local;
use env_logger::{Builder, Target, WriteStyle};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("logger already initialized: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Install the global logger. `RUST_LOG`, when set, overrides the level.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let file = match &config.file {
        Some(path) => Some(open_log_file(path)?),
        None => None,
    };

    let mut builder = Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filters) if !filters.trim().is_empty() => {
            builder.parse_filters(&filters);
        }
        _ => {
            builder.filter_level(config.level);
        }
    }

    let format = config.format;
    builder
        .format(move |buf, record| {
            let line = format_line(
                format,
                &Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                record.level(),
                record.target(),
                &record.args().to_string(),
            );
            writeln!(buf, "{}", line)
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(Tee { file })));

    builder.try_init()?;
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let error = |source| LoggingError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(error)
}

/// One log line, without the trailing newline.
pub fn format_line(
    format: LogFormat,
    timestamp: &str,
    level: log::Level,
    target: &str,
    message: &str,
) -> String {
    match format {
        LogFormat::Text => format!("{} [{}] {}", timestamp, level, message),
        LogFormat::Json => serde_json::json!({
            "timestamp": timestamp,
            "level": level.as_str(),
            "target": target,
            "message": message,
        })
        .to_string(),
    }
}

/// Copies every write to stderr and to the log file.
struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_line() {
        let line = format_line(
            LogFormat::Text,
            "2026-10-19 08:30:00",
            log::Level::Warn,
            "publipostage",
            "Ligne 2: email invalide",
        );
        assert_eq!(line, "2026-10-19 08:30:00 [WARN] Ligne 2: email invalide");
    }

    #[test]
    fn test_json_line() {
        let line = format_line(
            LogFormat::Json,
            "2026-10-19 08:30:00",
            log::Level::Info,
            "publipostage::pipeline",
            "Generated \"a\"",
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "Generated \"a\"");
    }

    #[test]
    fn test_tee_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("mail.log");
        let mut tee = Tee {
            file: Some(open_log_file(&path).unwrap()),
        };

        tee.write_all(b"hello\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }
}

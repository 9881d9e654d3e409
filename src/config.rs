//! Run configuration, built once from the environment.
//!
//! Values come from process environment variables (a `.env` file is loaded
//! beforehand by the CLI), each with a default. Parsing goes through a
//! key lookup function so tests can feed a plain map.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::mail::retry::RetryPolicy;
use crate::mail::signature::SignatureOptions;

pub const DEFAULT_PLACEHOLDER: &str = "{{VENDEUR}}";
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "Soumission - {nom}";
pub const DEFAULT_FALLBACK_BODY_HTML: &str = "Bonjour {nom},<br>Je me permets de vous transmettre notre soumission.<br><br>\
Vous trouverez ci-joint le document détaillant notre proposition.<br>\
Nous restons disponibles pour toute précision ou information complémentaire.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTransport {
    Smtp,
    Desktop,
}

impl FromStr for MailTransport {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "desktop" | "outlook" => Ok(Self::Desktop),
            _ => Err(()),
        }
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (port 465).
    Tls,
    StartTls,
    None,
}

impl FromStr for TlsMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            "none" | "plain" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub template: PathBuf,
    pub input: PathBuf,
    pub docx_dir: PathBuf,
    pub pdf_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub placeholder: String,
    /// Prefix document names with the record sequence number.
    pub numbered: bool,
    /// Extra attempts after a failed render.
    pub render_retries: u32,
    pub converter_bin: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub send_email: bool,
    pub transport: MailTransport,
    pub from_account: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject_template: String,
    pub fallback_body_html: String,
    pub use_email_template: bool,
    pub email_template_file: PathBuf,
    pub outlook_shell: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: TlsMode,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: log::LevelFilter,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

/// Immutable configuration of one merge run.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub paths: PathsConfig,
    pub render: RenderConfig,
    pub mail: MailConfig,
    pub smtp: SmtpConfig,
    pub signature: SignatureOptions,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
}

impl MergeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let paths = PathsConfig {
            template: vars.path("TEMPLATE_PATH", "templates/modele.docx"),
            input: vars.path("INPUT_CSV", "data/entrepreneurs.csv"),
            docx_dir: vars.path("OUTPUT_DOCX_DIR", "out/docx"),
            pdf_dir: vars.path("OUTPUT_PDF_DIR", "out/pdf"),
        };

        let render = RenderConfig {
            placeholder: vars.string("PLACEHOLDER", DEFAULT_PLACEHOLDER),
            numbered: vars.flag("NUMBERED_OUTPUTS", true)?,
            render_retries: vars.parse("RENDER_RETRIES", 0)?,
            converter_bin: vars.string("CONVERTER_BIN", crate::convert::soffice::DEFAULT_PROGRAM),
        };

        let from_account = vars.get("FROM_ACCOUNT");
        let mail = MailConfig {
            send_email: vars.flag("SEND_EMAIL", true)?,
            transport: vars.parse("MAIL_TRANSPORT", MailTransport::Smtp)?,
            from_account: from_account.clone(),
            cc: split_addresses(&vars.get("CC").unwrap_or_default()),
            bcc: split_addresses(&vars.get("BCC").unwrap_or_default()),
            subject_template: vars.string("SUBJECT_TEMPLATE", DEFAULT_SUBJECT_TEMPLATE),
            fallback_body_html: vars.string("FALLBACK_BODY_HTML", DEFAULT_FALLBACK_BODY_HTML),
            use_email_template: vars.flag("USE_EMAIL_TEMPLATE", true)?,
            email_template_file: vars.path(
                "EMAIL_TEMPLATE_FILE",
                "templates/emails/soumission_template.html",
            ),
            outlook_shell: vars.string("OUTLOOK_SHELL", "powershell"),
        };

        let smtp = SmtpConfig {
            host: vars.get("SMTP_HOST"),
            port: vars.parse("SMTP_PORT", 465)?,
            username: vars.get("SMTP_USERNAME").or(from_account),
            password: vars.get("SMTP_PASSWORD"),
            tls: vars.parse("SMTP_TLS", TlsMode::Tls)?,
            timeout: Duration::from_secs(vars.parse("SMTP_TIMEOUT", 30)?),
        };

        let signatures_dir = vars.get("SIGNATURES_DIR").map(PathBuf::from).unwrap_or_else(|| {
            PathBuf::from(vars.get("APPDATA").unwrap_or_default())
                .join("Microsoft")
                .join("Signatures")
        });
        let signature = SignatureOptions {
            use_project: vars.flag("USE_PROJECT_SIGNATURE", true)?,
            project_file: vars.path("PROJECT_SIGNATURE_FILE", "signatures/signature.html"),
            name: vars.get("SIGNATURE_NAME"),
            use_system: vars.flag("USE_SYSTEM_SIGNATURE", false)?,
            embed_images: vars.flag("EMBED_SIGNATURE_IMAGES", false)?,
            signatures_dir,
        };

        let delay: f64 = vars.parse("DELAY_SECONDS", 2.0)?;
        if !delay.is_finite() || delay < 0.0 {
            return Err(ConfigError::Invalid {
                key: "DELAY_SECONDS",
                value: delay.to_string(),
            });
        }
        let retry = RetryPolicy::new(vars.parse("MAX_RETRIES", 5)?, Duration::from_secs_f64(delay));

        let logging = LoggingConfig {
            level: vars.parse("LOG_LEVEL", log::LevelFilter::Info)?,
            format: vars.parse("LOG_FORMAT", LogFormat::Text)?,
            file: match (vars.lookup)("LOG_FILE") {
                Some(value) if value.trim().is_empty() => None,
                Some(value) => Some(PathBuf::from(value.trim())),
                None => Some(PathBuf::from("out/logs/mail.log")),
            },
        };

        Ok(Self {
            paths,
            render,
            mail,
            smtp,
            signature,
            retry,
            logging,
        })
    }
}

/// Split a `,` or `;` separated address list.
pub fn split_addresses(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn path(&self, key: &str, default: &str) -> PathBuf {
        PathBuf::from(self.string(key, default))
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" | "oui" => Ok(true),
                "0" | "false" | "no" | "off" | "non" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value }),
            },
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<MergeConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MergeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.paths.template, PathBuf::from("templates/modele.docx"));
        assert_eq!(config.paths.input, PathBuf::from("data/entrepreneurs.csv"));
        assert_eq!(config.render.placeholder, "{{VENDEUR}}");
        assert!(config.render.numbered);
        assert_eq!(config.render.render_retries, 0);
        assert!(config.mail.send_email);
        assert_eq!(config.mail.transport, MailTransport::Smtp);
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.tls, TlsMode::Tls);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay, Duration::from_secs(2));
        assert!(config.signature.use_project);
        assert!(!config.signature.use_system);
        assert_eq!(config.logging.file, Some(PathBuf::from("out/logs/mail.log")));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("MAIL_TRANSPORT", "desktop"),
            ("CC", "a@x.com; b@x.com,"),
            ("SEND_EMAIL", "false"),
            ("DELAY_SECONDS", "0.5"),
            ("FROM_ACCOUNT", "moi@x.com"),
            ("LOG_FILE", ""),
            ("SMTP_TLS", "starttls"),
        ])
        .unwrap();

        assert_eq!(config.mail.transport, MailTransport::Desktop);
        assert_eq!(config.mail.cc, vec!["a@x.com", "b@x.com"]);
        assert!(!config.mail.send_email);
        assert_eq!(config.retry.delay, Duration::from_millis(500));
        assert_eq!(config.smtp.username.as_deref(), Some("moi@x.com"));
        assert_eq!(config.smtp.tls, TlsMode::StartTls);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("SMTP_PORT", "abc")]),
            Err(ConfigError::Invalid { key: "SMTP_PORT", .. })
        ));
        assert!(matches!(
            config(&[("SEND_EMAIL", "peut-être")]),
            Err(ConfigError::Invalid { key: "SEND_EMAIL", .. })
        ));
        assert!(matches!(
            config(&[("DELAY_SECONDS", "-1")]),
            Err(ConfigError::Invalid { key: "DELAY_SECONDS", .. })
        ));
    }

    #[test]
    fn test_max_retries_floor() {
        let config = config(&[("MAX_RETRIES", "0")]).unwrap();
        assert_eq!(config.retry.max_attempts, 1);
    }
}

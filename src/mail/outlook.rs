//! Outlook session driven through PowerShell COM automation.
//!
//! Each step runs one short script. The message is saved after every change
//! and looked up again by its `EntryID` in the next step. Scripts are written
//! as UTF-8 with a byte order mark so Windows PowerShell reads accented text
//! correctly.

use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;

use super::desktop::{Envelope, MailSession, MessageId, SessionError};

const PRELUDE: &str = "$ErrorActionPreference = 'Stop'
$outlook = New-Object -ComObject Outlook.Application
$ns = $outlook.GetNamespace('MAPI')
";

/// Default signature for new messages, newest Office version first.
const DEFAULT_SIGNATURE_SCRIPT: &str = "foreach ($v in '16.0', '15.0', '14.0') {
    $key = \"HKCU:\\Software\\Microsoft\\Office\\$v\\Common\\MailSettings\"
    try { $name = (Get-ItemProperty -Path $key -Name NewSignature -ErrorAction Stop).NewSignature } catch { continue }
    if ($name) { Write-Output $name; break }
}
";

const PR_ATTACH_CONTENT_ID: &str = "http://schemas.microsoft.com/mapi/proptag/0x3712001F";
const OL_MAIL_ITEM: u32 = 0;
const OL_FOLDER_INBOX: u32 = 6;

pub struct OutlookSession {
    shell: String,
    ready: AtomicBool,
}

impl OutlookSession {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            ready: AtomicBool::new(false),
        }
    }

    async fn run(&self, operation: &str, body: &str) -> Result<String, SessionError> {
        self.run_script(operation, &format!("{}{}", PRELUDE, body)).await
    }

    async fn run_script(&self, operation: &str, script: &str) -> Result<String, SessionError> {
        let error = |message: String| SessionError::new(operation, message);

        let mut file = tempfile::Builder::new()
            .prefix("publipostage-")
            .suffix(".ps1")
            .tempfile()
            .map_err(|e| error(format!("cannot create script: {}", e)))?;
        file.write_all(b"\xEF\xBB\xBF")
            .and_then(|_| file.write_all(script.as_bytes()))
            .map_err(|e| error(format!("cannot write script: {}", e)))?;
        let path = file.into_temp_path();

        let output = Command::new(&self.shell)
            .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"])
            .arg(&*path)
            .output()
            .await
            .map_err(|e| error(format!("cannot start {}: {}", self.shell, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(error(if stderr.is_empty() { stdout } else { stderr }));
        }

        log::debug!("[outlook] {} ok", operation);
        Ok(stdout)
    }
}

/// PowerShell single-quoted literal. Curly single quotes act as quotes too and
/// are doubled the same way.
pub fn ps_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if matches!(c, '\'' | '\u{2018}'..='\u{201B}') {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

fn load_item(message: &MessageId) -> String {
    format!("$mail = $ns.GetItemFromID({})\n", ps_quote(&message.0))
}

#[async_trait]
impl MailSession for OutlookSession {
    async fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let script = format!(
            "try {{ $ns.Logon('', '', $false, $false) }} catch {{ Write-Warning 'Logon failed, assuming an active session' }}
try {{ $null = $ns.GetDefaultFolder({}) }} catch {{ Write-Warning 'Inbox unavailable' }}
",
            OL_FOLDER_INBOX
        );
        self.run("ensure_ready", &script).await?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<(String, String)>, SessionError> {
        let output = self
            .run(
                "accounts",
                "foreach ($a in $ns.Session.Accounts) { Write-Output ('{0}|{1}' -f $a.DisplayName, $a.SmtpAddress) }\n",
            )
            .await?;

        Ok(output
            .lines()
            .filter_map(|line| line.split_once('|'))
            .map(|(name, address)| (name.trim().to_string(), address.trim().to_string()))
            .collect())
    }

    async fn create_message(&self) -> Result<MessageId, SessionError> {
        let script = format!(
            "$mail = $outlook.CreateItem({})\n$mail.Save()\nWrite-Output $mail.EntryID\n",
            OL_MAIL_ITEM
        );
        let output = self.run("create_message", &script).await?;
        let id = output.lines().last().unwrap_or_default().trim();
        if id.is_empty() {
            return Err(SessionError::new("create_message", "no EntryID returned"));
        }
        Ok(MessageId(id.to_string()))
    }

    async fn select_account(&self, message: &MessageId, address: &str) -> Result<bool, SessionError> {
        let script = format!(
            "{}$acct = $null
foreach ($a in $ns.Session.Accounts) {{ if ($a.SmtpAddress -and $a.SmtpAddress.ToLower() -eq {}) {{ $acct = $a; break }} }}
if ($acct -eq $null) {{ Write-Output 'NOTFOUND' }} else {{ $mail.SendUsingAccount = $acct; $mail.Save(); Write-Output 'OK' }}
",
            load_item(message),
            ps_quote(&address.to_lowercase())
        );
        let output = self.run("select_account", &script).await?;
        Ok(output.lines().last() == Some("OK"))
    }

    async fn set_envelope(&self, message: &MessageId, envelope: &Envelope) -> Result<(), SessionError> {
        let mut script = load_item(message);
        script.push_str(&format!("$mail.To = {}\n", ps_quote(&envelope.to)));
        if !envelope.cc.is_empty() {
            script.push_str(&format!("$mail.CC = {}\n", ps_quote(&envelope.cc)));
        }
        if !envelope.bcc.is_empty() {
            script.push_str(&format!("$mail.BCC = {}\n", ps_quote(&envelope.bcc)));
        }
        script.push_str(&format!("$mail.Subject = {}\n$mail.Save()\n", ps_quote(&envelope.subject)));
        self.run("set_envelope", &script).await.map(|_| ())
    }

    async fn set_html_body(&self, message: &MessageId, html: &str) -> Result<(), SessionError> {
        let script = format!("{}$mail.HTMLBody = {}\n$mail.Save()\n", load_item(message), ps_quote(html));
        self.run("set_html_body", &script).await.map(|_| ())
    }

    async fn attach(
        &self,
        message: &MessageId,
        path: &Path,
        content_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut script = format!(
            "{}$att = $mail.Attachments.Add({})\n",
            load_item(message),
            ps_quote(&absolute.to_string_lossy())
        );
        if let Some(cid) = content_id {
            script.push_str(&format!(
                "$att.PropertyAccessor.SetProperty({}, {})\n",
                ps_quote(PR_ATTACH_CONTENT_ID),
                ps_quote(cid)
            ));
        }
        script.push_str("$mail.Save()\n");
        self.run("attach", &script).await.map(|_| ())
    }

    async fn save(&self, message: &MessageId) -> Result<(), SessionError> {
        let script = format!("{}$mail.Save()\n", load_item(message));
        self.run("save", &script).await.map(|_| ())
    }

    async fn send(&self, message: &MessageId) -> Result<(), SessionError> {
        let script = format!("{}$mail.Send()\n", load_item(message));
        self.run("send", &script).await.map(|_| ())
    }

    /// Read from the Office mail settings in the registry; no COM needed.
    async fn default_signature_name(&self) -> Result<Option<String>, SessionError> {
        let output = self
            .run_script("default_signature_name", DEFAULT_SIGNATURE_SCRIPT)
            .await?;
        Ok(output
            .lines()
            .last()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }
}

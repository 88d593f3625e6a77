//! Failure notification by mail.

#[cfg(feature = "smtp")]
mod smtp;

use std::process::Stdio;
use std::str::FromStr;

use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::core::error::{Error, Result};

/// Delivers a report about one feed.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&self, feed: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MailSecurity {
    #[default]
    Ssl,
    StartTls,
    Insecure,
}

impl FromStr for MailSecurity {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "SSL" => Ok(MailSecurity::Ssl),
            "STARTTLS" => Ok(MailSecurity::StartTls),
            "INSECURE" => Ok(MailSecurity::Insecure),
            other => Err(Error::config(format!("unknown MAIL_TYPE: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailSettings {
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    /// Empty or `sendmail` selects the local `mail` command.
    pub server: Option<String>,
    pub security: MailSecurity,
    pub port: Option<u16>,
}

impl MailSettings {
    pub fn uses_local_relay(&self) -> bool {
        match self.server.as_deref().map(str::trim) {
            None | Some("") | Some("sendmail") => true,
            Some(_) => false,
        }
    }
}

/// Mail delivery chosen from the settings.
#[derive(Debug, Clone)]
pub enum Mailer {
    /// No sender or recipient configured.
    Disabled,
    /// The local `mail` command.
    LocalRelay(MailSettings),
    #[cfg(feature = "smtp")]
    Smtp(MailSettings),
}

impl Mailer {
    pub fn from_settings(settings: MailSettings) -> Result<Self> {
        if settings.from.trim().is_empty() || settings.to.trim().is_empty() {
            return Ok(Mailer::Disabled);
        }
        if settings.uses_local_relay() {
            return Ok(Mailer::LocalRelay(settings));
        }
        Self::smtp(settings)
    }

    #[cfg(feature = "smtp")]
    fn smtp(settings: MailSettings) -> Result<Self> {
        Ok(Mailer::Smtp(settings))
    }

    #[cfg(not(feature = "smtp"))]
    fn smtp(settings: MailSettings) -> Result<Self> {
        Err(Error::config(format!(
            "MAIL_SRV {} needs the smtp feature",
            settings.server.unwrap_or_default()
        )))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Mailer::Disabled)
    }
}

impl Notifier for Mailer {
    async fn notify(&self, feed: &str, subject: &str, body: &str) -> Result<()> {
        match self {
            Mailer::Disabled => {
                debug!("{feed}: mail disabled, dropping \"{subject}\"");
                Ok(())
            }
            Mailer::LocalRelay(settings) => send_local(settings, subject, body).await,
            #[cfg(feature = "smtp")]
            Mailer::Smtp(settings) => smtp::send(settings.clone(), subject, body).await,
        }?;
        info!("{feed}: sent \"{subject}\"");
        Ok(())
    }
}

/// Arguments for `mail`, recipient last.
pub fn relay_args(settings: &MailSettings, subject: &str) -> Vec<String> {
    let mut args = Vec::new();
    args.push("-r".to_string());
    args.push(settings.from.trim().to_string());
    args.push("-s".to_string());
    args.push(subject.to_string());
    for (flag, value) in [("-c", &settings.cc), ("-b", &settings.bcc)] {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
    }
    args.push(settings.to.trim().to_string());
    args
}

async fn send_local(settings: &MailSettings, subject: &str, body: &str) -> Result<()> {
    let args = relay_args(settings, subject);
    let mut child = Command::new("mail")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| Error::Command {
            command: "mail".to_string(),
            status: "spawn failed".to_string(),
            stderr: err.to_string(),
        })?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(body.as_bytes()).await?;
    }
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(Error::Command {
            command: format!("mail {}", args.join(" ")),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

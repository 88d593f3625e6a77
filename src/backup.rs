//! Off-host copies of the archive through a templated shell command.

use std::path::Path;

use log::{debug, info};
use time::Date;
use tokio::process::Command;

use crate::core::clock::yesterday;
use crate::core::error::{Error, Result};

#[allow(async_fn_in_trait)]
pub trait Backup {
    /// Runs the backup `template` for a feed rooted at `archive_root`.
    async fn sync(&self, archive_root: &Path, template: &str, today: Date) -> Result<()>;
}

/// Expands `$BACKUP_HOST`, `$BACKUP_ROOT` and the date tokens `$cyear`,
/// `$cmon`, `$cday` (today) and `$yyear`, `$ymon`, `$yday` (yesterday).
pub fn expand_template(template: &str, host: &str, root: &str, today: Date) -> String {
    let previous = yesterday(today);
    let replacements = [
        ("$BACKUP_HOST", host.to_string()),
        ("$BACKUP_ROOT", root.to_string()),
        ("$cyear", format!("{:04}", today.year())),
        ("$cmon", format!("{:02}", today.month() as u8)),
        ("$cday", format!("{:02}", today.day())),
        ("$yyear", format!("{:04}", previous.year())),
        ("$ymon", format!("{:02}", previous.month() as u8)),
        ("$yday", format!("{:02}", previous.day())),
    ];
    replacements
        .iter()
        .fold(template.to_string(), |command, (token, value)| command.replace(token, value))
}

/// Runs the expanded template with `sh -c` inside the feed's archive root.
#[derive(Debug, Clone, Default)]
pub struct RsyncBackup {
    host: Option<String>,
    root: Option<String>,
}

impl RsyncBackup {
    pub fn new(host: Option<String>, root: Option<String>) -> Self {
        Self { host, root }
    }

    fn host(&self) -> Option<&str> {
        self.host.as_deref().map(str::trim).filter(|host| !host.is_empty())
    }
}

impl Backup for RsyncBackup {
    async fn sync(&self, archive_root: &Path, template: &str, today: Date) -> Result<()> {
        let Some(host) = self.host() else {
            debug!("no BACKUP_HOST, skipping backup of {}", archive_root.display());
            return Ok(());
        };
        if template.trim().is_empty() {
            return Ok(());
        }
        let command = expand_template(template, host, self.root.as_deref().unwrap_or(""), today);
        info!("backup: {command}");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(archive_root)
            .output()
            .await
            .map_err(|err| Error::Command {
                command: command.clone(),
                status: "spawn failed".to_string(),
                stderr: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{}", stdout.trim());
        }
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::layout::LayoutError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error for {target}: {message}")]
    Transport {
        target: String,
        status: Option<u16>,
        message: String,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("archive error during {operation} on {}: {source}", path.display())]
    Archive {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive error: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("command `{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transport(target: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transport {
            target: target.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn archive(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Error::Archive {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short label used in run reports and notification subjects.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport { .. } => "transport",
            Error::Config(_) => "config",
            Error::Archive { .. } | Error::Corrupt(_) | Error::Layout(_) => "archive",
            Error::Command { .. } => "command",
            Error::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        let target = value
            .url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        Error::Transport {
            target,
            status: value.status().map(|status| status.as_u16()),
            message: value.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Corrupt(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

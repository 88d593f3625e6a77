use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::scope::{PathStyle, Scope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    EmptyComponent { field: &'static str },
    InvalidComponent { field: &'static str, value: String },
    MissingDay { scope: String },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::EmptyComponent { field } => {
                write!(f, "empty path component: {field}")
            }
            LayoutError::InvalidComponent { field, value } => {
                write!(f, "invalid path component for {field}: {value}")
            }
            LayoutError::MissingDay { scope } => {
                write!(f, "scope {scope} has no day for a day-partitioned path")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

type Result<T> = std::result::Result<T, LayoutError>;

/// Date-partitioned archive tree: `{root}/{year}/{month}[/{day}]/{filename}`.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    style: PathStyle,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, style: PathStyle) -> Self {
        Self {
            root: root.into(),
            style,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn month_dir(&self, scope: &Scope) -> PathBuf {
        self.root
            .join(scope.year_str())
            .join(scope.month_str(self.style))
    }

    pub fn day_dir(&self, scope: &Scope) -> Result<PathBuf> {
        let day = scope.day_str(self.style).ok_or_else(|| LayoutError::MissingDay {
            scope: scope.to_string(),
        })?;
        Ok(self.month_dir(scope).join(day))
    }
}

pub fn validate_component(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LayoutError::EmptyComponent { field });
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(LayoutError::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    if value.contains('\0') {
        return Err(LayoutError::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

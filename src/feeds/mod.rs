//! Provider families and the capability interface the coordinator drives.
//!
//! Each family implements [`FeedSource`]; [`Source`] closes over them so a
//! registry can hold feeds of every family in one collection.

pub mod a51;
pub mod datafeeds;
pub mod hda;
pub mod nrdp;
pub mod opendata;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use time::Date;

use crate::core::error::{Error, Result};
use crate::core::object::{FeedIdentity, ProviderKind, RemoteObject};
use crate::core::scope::Scope;
use crate::reconcile::Selection;
use crate::storage::{ArchiveEntry, Archiver, Codec};
use crate::transport::Download;

pub use a51::A51Source;
pub use datafeeds::DatafeedsSource;
pub use hda::HdaSource;
pub use nrdp::{DayFilter, NrdpSource};
pub use opendata::{OpendataKind, OpendataSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    A51,
    Nrdp,
    Hda,
    Opendata,
    Datafeeds,
}

impl Family {
    pub const ALL: [Family; 5] = [
        Family::A51,
        Family::Nrdp,
        Family::Hda,
        Family::Opendata,
        Family::Datafeeds,
    ];

    /// Family selected by a feed's name prefix.
    pub fn from_feed_name(name: &str) -> Result<Self> {
        const PREFIXES: [(&str, Family); 7] = [
            ("a51_", Family::A51),
            ("nrdp_", Family::Nrdp),
            ("hda", Family::Hda),
            ("atoc", Family::Opendata),
            ("incidents", Family::Opendata),
            ("sched_", Family::Datafeeds),
            ("data_", Family::Datafeeds),
        ];
        PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, family)| *family)
            .ok_or_else(|| Error::config(format!("feed {name}: no provider family for this name")))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::A51 => "a51",
            Family::Nrdp => "nrdp",
            Family::Hda => "hda",
            Family::Opendata => "opendata",
            Family::Datafeeds => "datafeeds",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Family::ALL
            .into_iter()
            .find(|family| family.as_str() == value)
            .ok_or_else(|| Error::config(format!("unknown feed family: {value}")))
    }
}

/// What happens to a run error once it has been reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return the error to the caller.
    #[default]
    Reraise,
    /// Report it as a failed outcome instead.
    Swallow,
}

/// Per-feed settings the coordinator needs regardless of family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPolicy {
    pub archive_root: PathBuf,
    /// Marker key; the feed name unless overridden.
    pub marker: String,
    pub on_failure: FailurePolicy,
    /// Backup command template.
    pub rsync: Option<String>,
}

impl FeedPolicy {
    pub fn new(name: &str, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            archive_root: archive_root.into(),
            marker: name.to_string(),
            on_failure: FailurePolicy::Reraise,
            rsync: None,
        }
    }
}

/// Storage side shared by every family: where to write and how to
/// post-process.
#[derive(Debug, Clone, Default)]
pub struct Storage {
    pub archiver: Archiver,
    pub codec: Codec,
}

/// The capabilities a feed offers to the coordinator.
///
/// `list`, `archived` and `select` are skipped for single-URL feeds, which
/// supply their one object through `single_object` instead.
#[allow(async_fn_in_trait)]
pub trait FeedSource {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn policy(&self) -> &FeedPolicy;

    /// Scope used when the caller gives no explicit date.
    fn default_scope(&self, today: Date) -> Scope;

    fn identity(&self, scope: Scope) -> FeedIdentity {
        FeedIdentity {
            name: self.name().to_string(),
            provider_kind: self.kind(),
            scope,
        }
    }

    fn single_object(&self, _scope: &Scope) -> Option<Selection> {
        None
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<RemoteObject>>;

    fn archived(&self, scope: &Scope) -> Result<Vec<ArchiveEntry>>;

    fn select(
        &self,
        scope: &Scope,
        listed: &[RemoteObject],
        archived: &[ArchiveEntry],
    ) -> Result<Vec<Selection>>;

    async fn fetch(&self, selection: &Selection) -> Result<Download>;

    /// Stores a fetched object. `None` means the content was discarded
    /// (already present or unchanged) and nothing new was archived.
    async fn archive(
        &self,
        scope: &Scope,
        selection: &Selection,
        download: Download,
    ) -> Result<Option<PathBuf>>;
}

/// Closed set of provider families.
pub enum Source {
    A51(A51Source),
    Nrdp(NrdpSource),
    Hda(HdaSource),
    Opendata(OpendataSource),
    Datafeeds(DatafeedsSource),
}

macro_rules! dispatch {
    ($self:ident, $source:ident => $body:expr) => {
        match $self {
            Source::A51($source) => $body,
            Source::Nrdp($source) => $body,
            Source::Hda($source) => $body,
            Source::Opendata($source) => $body,
            Source::Datafeeds($source) => $body,
        }
    };
}

impl Source {
    pub fn family(&self) -> Family {
        match self {
            Source::A51(_) => Family::A51,
            Source::Nrdp(_) => Family::Nrdp,
            Source::Hda(_) => Family::Hda,
            Source::Opendata(_) => Family::Opendata,
            Source::Datafeeds(_) => Family::Datafeeds,
        }
    }
}

impl FeedSource for Source {
    fn name(&self) -> &str {
        dispatch!(self, source => source.name())
    }

    fn kind(&self) -> ProviderKind {
        dispatch!(self, source => source.kind())
    }

    fn policy(&self) -> &FeedPolicy {
        dispatch!(self, source => source.policy())
    }

    fn default_scope(&self, today: Date) -> Scope {
        dispatch!(self, source => source.default_scope(today))
    }

    fn single_object(&self, scope: &Scope) -> Option<Selection> {
        dispatch!(self, source => source.single_object(scope))
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<RemoteObject>> {
        dispatch!(self, source => source.list(scope).await)
    }

    fn archived(&self, scope: &Scope) -> Result<Vec<ArchiveEntry>> {
        dispatch!(self, source => source.archived(scope))
    }

    fn select(
        &self,
        scope: &Scope,
        listed: &[RemoteObject],
        archived: &[ArchiveEntry],
    ) -> Result<Vec<Selection>> {
        dispatch!(self, source => source.select(scope, listed, archived))
    }

    async fn fetch(&self, selection: &Selection) -> Result<Download> {
        dispatch!(self, source => source.fetch(selection).await)
    }

    async fn archive(
        &self,
        scope: &Scope,
        selection: &Selection,
        download: Download,
    ) -> Result<Option<PathBuf>> {
        dispatch!(self, source => source.archive(scope, selection, download).await)
    }
}

/// Places a possibly nested provider name (`sub/file.gz`) below `dir`.
pub(crate) fn nested_target(dir: &Path, name: &str) -> Result<(PathBuf, String)> {
    let mut parts: Vec<&str> = name.split('/').collect();
    let filename = parts.pop().unwrap_or_default();
    let mut target = dir.to_path_buf();
    for part in parts {
        crate::layout::validate_component("name", part)?;
        target.push(part);
    }
    crate::layout::validate_component("filename", filename)?;
    Ok((target, filename.to_string()))
}

//! National Rail Data Portal buckets (Darwin logs, reference data), read with
//! account credentials.

use std::path::PathBuf;

use log::{debug, info};
use time::Date;
use tokio::sync::OnceCell;

use crate::core::clock::yesterday;
use crate::core::error::{Error, Result};
use crate::core::object::{ProviderKind, RemoteObject};
use crate::core::scope::{PathStyle, Scope};
use crate::feeds::{nested_target, FeedPolicy, FeedSource, Storage};
use crate::layout::ArchiveLayout;
use crate::reconcile::{archived_stems, DateExactFilter, Selection};
use crate::storage::{scan_tree, stem, ArchiveEntry};
use crate::transport::{Download, S3Settings, S3Store};

/// Which day a feed follows by default, and whether objects are kept only
/// when modified on that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayFilter {
    Todays,
    Yesterdays,
}

impl std::str::FromStr for DayFilter {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "todays" => Ok(DayFilter::Todays),
            "yesterdays" => Ok(DayFilter::Yesterdays),
            other => Err(Error::config(format!("unknown filter: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NrdpSettings {
    pub s3: S3Settings,
    /// Static part of the key.
    pub key: String,
    /// Whether objects sit below `{year}/{year}{MM}/`.
    pub date_in_key: bool,
    pub filetype: Option<String>,
    pub filter: Option<DayFilter>,
}

pub struct NrdpSource {
    name: String,
    policy: FeedPolicy,
    settings: NrdpSettings,
    layout: ArchiveLayout,
    storage: Storage,
    s3: OnceCell<S3Store>,
}

impl NrdpSource {
    pub fn new(
        name: impl Into<String>,
        policy: FeedPolicy,
        settings: NrdpSettings,
        storage: Storage,
    ) -> Self {
        let layout = ArchiveLayout::new(policy.archive_root.clone(), PathStyle::ZeroPadded);
        Self {
            name: name.into(),
            policy,
            settings,
            layout,
            storage,
            s3: OnceCell::new(),
        }
    }

    pub fn prefix(&self, scope: &Scope) -> String {
        let mut prefix = self.settings.key.clone();
        if self.settings.date_in_key {
            let year = scope.year_str();
            let month = scope.month_str(PathStyle::ZeroPadded);
            prefix.push_str(&format!("{year}/{year}{month}/"));
        }
        prefix
    }

    async fn store(&self) -> &S3Store {
        self.s3
            .get_or_init(|| S3Store::connect(&self.settings.s3))
            .await
    }
}

impl FeedSource for NrdpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::S3
    }

    fn policy(&self) -> &FeedPolicy {
        &self.policy
    }

    fn default_scope(&self, today: Date) -> Scope {
        match self.settings.filter {
            Some(DayFilter::Yesterdays) => Scope::day_of(yesterday(today)),
            _ => Scope::day_of(today),
        }
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<RemoteObject>> {
        let mut objects = self.store().await.list(&self.prefix(scope)).await?;
        if let Some(filetype) = self.settings.filetype.as_deref() {
            let needle = format!(".{filetype}");
            objects.retain(|object| object.key.contains(&needle));
        }
        Ok(objects)
    }

    fn archived(&self, scope: &Scope) -> Result<Vec<ArchiveEntry>> {
        scan_tree(&self.layout.day_dir(scope)?)
    }

    fn select(
        &self,
        scope: &Scope,
        listed: &[RemoteObject],
        archived: &[ArchiveEntry],
    ) -> Result<Vec<Selection>> {
        scope.require_day()?;
        let candidates = match self.settings.filter {
            Some(_) => DateExactFilter.select(listed, scope)?,
            None => listed.to_vec(),
        };
        let prefix = self.prefix(scope);
        let present = archived_stems(archived);

        let mut selected = Vec::new();
        for object in candidates {
            let name = object
                .key
                .strip_prefix(&prefix)
                .unwrap_or(&object.key)
                .to_string();
            if name.is_empty() {
                continue;
            }
            let name_stem = stem(&name).to_string();
            if present.contains(&name_stem) {
                debug!("{name}: already archived");
                continue;
            }
            selected.push(Selection {
                object,
                stem: name_stem,
                archive_name: name,
            });
        }
        Ok(selected)
    }

    async fn fetch(&self, selection: &Selection) -> Result<Download> {
        info!("{}: getting new file {}", self.name, selection.archive_name);
        self.store().await.get(&selection.object.key).await
    }

    async fn archive(
        &self,
        scope: &Scope,
        selection: &Selection,
        download: Download,
    ) -> Result<Option<PathBuf>> {
        let (dir, filename) = nested_target(&self.layout.day_dir(scope)?, &selection.archive_name)?;
        let path = self.storage.archiver.store(download, &dir, &filename).await?;
        if self.storage.codec.is_none() {
            return Ok(Some(path));
        }
        Ok(Some(self.storage.archiver.recompress(&path, self.storage.codec, true)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Archiver, Codec};
    use tempfile::tempdir;
    use time::macros::{date, datetime};

    fn source(root: &std::path::Path, filter: Option<DayFilter>) -> NrdpSource {
        NrdpSource::new(
            "nrdp_logs",
            FeedPolicy::new("nrdp_logs", root),
            NrdpSettings {
                s3: S3Settings::anonymous("nrdp-v16-logs", "eu-west-1")
                    .with_credentials("id", "secret"),
                key: "logs/".to_string(),
                date_in_key: true,
                filetype: Some("gz".to_string()),
                filter,
            },
            Storage {
                archiver: Archiver::new(),
                codec: Codec::None,
            },
        )
    }

    #[test]
    fn prefix_carries_zero_padded_month() {
        let dir = tempdir().expect("tempdir");
        let source = source(dir.path(), Some(DayFilter::Todays));
        let scope = Scope::new(2023, 8, Some(5)).expect("scope");
        assert_eq!(source.prefix(&scope), "logs/2023/202308/");
    }

    #[test]
    fn default_scope_follows_filter() {
        let dir = tempdir().expect("tempdir");
        let today = date!(2023 - 08 - 01);
        let todays = source(dir.path(), Some(DayFilter::Todays));
        let yesterdays = source(dir.path(), Some(DayFilter::Yesterdays));
        assert_eq!(todays.default_scope(today), Scope::day_of(today));
        assert_eq!(
            yesterdays.default_scope(today),
            Scope::new(2023, 7, Some(31)).expect("scope")
        );
    }

    #[test]
    fn select_applies_date_filter_and_strips_prefix() {
        let dir = tempdir().expect("tempdir");
        let source = source(dir.path(), Some(DayFilter::Todays));
        let scope = Scope::new(2023, 8, Some(15)).expect("scope");
        let listed = vec![
            RemoteObject::new("logs/2023/202308/", datetime!(2023-08-15 01:00 UTC), 0),
            RemoteObject::new("logs/2023/202308/a.log.gz", datetime!(2023-08-14 23:00 UTC), 1),
            RemoteObject::new("logs/2023/202308/b.log.gz", datetime!(2023-08-15 09:00 UTC), 1),
        ];

        let selected = source.select(&scope, &listed, &[]).expect("select");

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].archive_name, "b.log.gz");
    }

    #[tokio::test]
    async fn archive_writes_under_padded_day() {
        let dir = tempdir().expect("tempdir");
        let source = source(dir.path(), None);
        let scope = Scope::new(2023, 8, Some(5)).expect("scope");
        let listed = vec![RemoteObject::new(
            "logs/2023/202308/c.log.gz",
            datetime!(2023-08-05 09:00 UTC),
            1,
        )];
        let selected = source.select(&scope, &listed, &[]).expect("select");

        let path = source
            .archive(&scope, &selected[0], Download::bytes(b"log".to_vec()))
            .await
            .expect("archive")
            .expect("stored");

        assert_eq!(path, dir.path().join("2023/08/05/c.log.gz"));
        let archived = source.archived(&scope).expect("scan");
        assert!(source.select(&scope, &listed, &archived).expect("select").is_empty());
    }

    #[tokio::test]
    async fn nested_keys_are_found_on_rerun() {
        let dir = tempdir().expect("tempdir");
        let source = source(dir.path(), None);
        let scope = Scope::new(2023, 8, Some(15)).expect("scope");
        let listed = vec![RemoteObject::new(
            "logs/2023/202308/sub/x.log.gz",
            datetime!(2023-08-15 09:00 UTC),
            1,
        )];
        let selected = source.select(&scope, &listed, &[]).expect("select");
        assert_eq!(selected[0].archive_name, "sub/x.log.gz");

        let path = source
            .archive(&scope, &selected[0], Download::bytes(b"log".to_vec()))
            .await
            .expect("archive")
            .expect("stored");
        assert_eq!(path, dir.path().join("2023/08/15/sub/x.log.gz"));

        let archived = source.archived(&scope).expect("scan");
        assert!(source.select(&scope, &listed, &archived).expect("select").is_empty());
    }
}

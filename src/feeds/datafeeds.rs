//! Network Rail Datafeeds: one authenticated download per day (schedules,
//! SMART, CORPUS).
//!
//! Reference-data feeds are republished unchanged most days; for those a
//! content hash decides whether the download is kept.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use time::Date;

use crate::core::clock::{weekday_abbrev, yesterday, Clock};
use crate::core::error::{Error, Result};
use crate::core::object::{ProviderKind, RemoteObject};
use crate::core::scope::{PathStyle, Scope};
use crate::feeds::{FeedPolicy, FeedSource, Storage};
use crate::layout::{validate_component, ArchiveLayout};
use crate::reconcile::Selection;
use crate::storage::{ArchiveEntry, MarkerStore};
use crate::transport::{Auth, Download, HttpClient};

const DAY_TOKEN: &str = "{theday}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatafeedsSettings {
    pub username: String,
    pub password: String,
    pub data_url: String,
    pub params: Vec<(String, String)>,
    pub filetype: String,
    /// Discard downloads identical to the previous one.
    pub detect_unchanged: bool,
    /// Compress as-is, appending the codec extension.
    pub recompress_in_place: bool,
}

pub struct DatafeedsSource {
    name: String,
    policy: FeedPolicy,
    settings: DatafeedsSettings,
    layout: ArchiveLayout,
    storage: Storage,
    http: HttpClient,
    hashes: MarkerStore,
    clock: Arc<dyn Clock>,
}

impl DatafeedsSource {
    pub fn new(
        name: impl Into<String>,
        policy: FeedPolicy,
        settings: DatafeedsSettings,
        storage: Storage,
        http: HttpClient,
        hashes: MarkerStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let layout = ArchiveLayout::new(policy.archive_root.clone(), PathStyle::ZeroPadded);
        Self {
            name: name.into(),
            policy,
            settings,
            layout,
            storage,
            http,
            hashes,
            clock,
        }
    }

    /// Request parameters with `{theday}` in `day` replaced by yesterday's
    /// weekday (`mon`..`sun`).
    pub fn query(&self, today: Date) -> Vec<(String, String)> {
        let weekday = weekday_abbrev(yesterday(today));
        self.settings
            .params
            .iter()
            .map(|(key, value)| {
                let value = if key == "day" {
                    value.replace(DAY_TOKEN, weekday)
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Whether `path` differs from the last stored content; records the new
    /// hash when it does.
    fn content_changed(&self, path: &Path) -> Result<bool> {
        let data = std::fs::read(path).map_err(|err| Error::archive("hash", path, err))?;
        let hash = blake3::hash(&data).to_hex().to_string();
        let previous = self.hashes.load_hash(&self.name)?;
        if previous.is_some_and(|record| record.last_hash == hash) {
            return Ok(false);
        }
        self.hashes.store_hash(&self.name, &hash)?;
        Ok(true)
    }
}

impl FeedSource for DatafeedsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::SingleUrl
    }

    fn policy(&self) -> &FeedPolicy {
        &self.policy
    }

    fn default_scope(&self, today: Date) -> Scope {
        Scope::day_of(today)
    }

    fn single_object(&self, _scope: &Scope) -> Option<Selection> {
        Some(Selection {
            object: RemoteObject::endpoint(self.settings.data_url.clone()),
            stem: self.name.clone(),
            archive_name: self.name.clone(),
        })
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<RemoteObject>> {
        Ok(self
            .single_object(scope)
            .map(|selection| selection.object)
            .into_iter()
            .collect())
    }

    fn archived(&self, _scope: &Scope) -> Result<Vec<ArchiveEntry>> {
        Ok(Vec::new())
    }

    fn select(
        &self,
        scope: &Scope,
        _listed: &[RemoteObject],
        _archived: &[ArchiveEntry],
    ) -> Result<Vec<Selection>> {
        Ok(self.single_object(scope).into_iter().collect())
    }

    async fn fetch(&self, _selection: &Selection) -> Result<Download> {
        let query = self.query(self.clock.today());
        info!("{}: downloading {}", self.name, self.settings.data_url);
        let auth = Auth::Basic {
            username: self.settings.username.clone(),
            password: self.settings.password.clone(),
        };
        self.http.get(&self.settings.data_url, &query, &auth).await
    }

    async fn archive(
        &self,
        scope: &Scope,
        _selection: &Selection,
        download: Download,
    ) -> Result<Option<PathBuf>> {
        let day = scope.require_day()?;
        let filename = format!("{day:02}.{}", self.settings.filetype);
        let dir = self.layout.month_dir(scope);
        validate_component("filename", &filename)?;
        let path = self.storage.archiver.store(download, &dir, &filename).await?;

        if self.settings.detect_unchanged && !self.content_changed(&path)? {
            info!("{}: content unchanged, discarding {}", self.name, path.display());
            std::fs::remove_file(&path).map_err(|err| Error::archive("discard", &path, err))?;
            return Ok(None);
        }
        if self.storage.codec.is_none() {
            return Ok(Some(path));
        }
        let strip = !self.settings.recompress_in_place;
        Ok(Some(self.storage.archiver.recompress(&path, self.storage.codec, strip)?))
    }
}

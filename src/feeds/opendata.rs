//! National Rail Open Data: single-URL feeds behind a token login.
//!
//! `atoc*` feeds download the weekly timetable zip; `incidents*` feeds
//! snapshot the incidents XML once an hour.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use time::Date;

use crate::core::clock::Clock;
use crate::core::error::{Error, Result};
use crate::core::object::{ProviderKind, RemoteObject};
use crate::core::scope::{PathStyle, Scope};
use crate::feeds::{FeedPolicy, FeedSource, Storage};
use crate::layout::{validate_component, ArchiveLayout};
use crate::reconcile::Selection;
use crate::storage::{repacked_names, ArchiveEntry};
use crate::transport::{Auth, Download, HttpClient};

pub const DEFAULT_AUTH_URL: &str = "https://opendata.nationalrail.co.uk/authenticate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpendataKind {
    Atoc,
    Incidents,
}

impl OpendataKind {
    pub fn from_feed_name(name: &str) -> Result<Self> {
        if name.starts_with("atoc") {
            Ok(OpendataKind::Atoc)
        } else if name.starts_with("incidents") {
            Ok(OpendataKind::Incidents)
        } else {
            Err(Error::config(format!("feed {name}: not an opendata feed")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpendataSettings {
    pub username: String,
    pub password: String,
    pub auth_url: String,
    pub data_url: String,
    pub filetype: String,
}

pub struct OpendataSource {
    name: String,
    kind: OpendataKind,
    policy: FeedPolicy,
    settings: OpendataSettings,
    layout: ArchiveLayout,
    storage: Storage,
    http: HttpClient,
    clock: Arc<dyn Clock>,
}

impl OpendataSource {
    pub fn new(
        name: impl Into<String>,
        policy: FeedPolicy,
        settings: OpendataSettings,
        storage: Storage,
        http: HttpClient,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let name = name.into();
        let kind = OpendataKind::from_feed_name(&name)?;
        let layout = ArchiveLayout::new(policy.archive_root.clone(), PathStyle::ZeroPadded);
        Ok(Self {
            name,
            kind,
            policy,
            settings,
            layout,
            storage,
            http,
            clock,
        })
    }

    async fn authenticate(&self) -> Result<String> {
        let reply = self
            .http
            .post_form(
                &self.settings.auth_url,
                &[
                    ("username", self.settings.username.as_str()),
                    ("password", self.settings.password.as_str()),
                ],
            )
            .await?;
        reply
            .get("token")
            .and_then(|token| token.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::transport(&self.settings.auth_url, "authentication reply has no token")
            })
    }

    /// The timetable zip, or an earlier repack of it under any codec, is
    /// already archived.
    fn atoc_present(&self, dir: &std::path::Path, filename: &str) -> bool {
        dir.join(filename).exists() || repacked_names(filename).any(|packed| dir.join(packed).exists())
    }

    async fn archive_atoc(&self, scope: &Scope, download: Download) -> Result<Option<PathBuf>> {
        let filename = download.filename_hint.clone().ok_or_else(|| {
            Error::transport(&self.settings.data_url, "response carries no Content-Disposition filename")
        })?;
        validate_component("filename", &filename)?;
        let dir = self.layout.month_dir(scope);
        if self.atoc_present(&dir, &filename) {
            info!("{}: {filename} already archived", self.name);
            return Ok(None);
        }
        let path = self.storage.archiver.store(download, &dir, &filename).await?;
        if self.storage.codec.is_none() {
            return Ok(Some(path));
        }
        Ok(Some(self.storage.archiver.repack(&path, self.storage.codec)?))
    }

    async fn archive_incidents(&self, scope: &Scope, download: Download) -> Result<Option<PathBuf>> {
        let hour = self.clock.now().hour();
        let filename = format!("{hour:02}.incidents.{}", self.settings.filetype);
        validate_component("filename", &filename)?;
        let dir = self.layout.day_dir(scope)?;
        let text = download.into_text().await?;
        let path = self.storage.archiver.store_gzip_text(&text, &dir, &filename)?;
        if self.storage.codec.is_none() {
            return Ok(Some(path));
        }
        Ok(Some(self.storage.archiver.recompress(&path, self.storage.codec, true)?))
    }
}

impl FeedSource for OpendataSource {
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
        let object = RemoteObject::endpoint(self.settings.data_url.clone());
        Some(Selection {
            stem: self.name.clone(),
            archive_name: self.name.clone(),
            object,
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
        let token = self.authenticate().await?;
        info!("{}: downloading {}", self.name, self.settings.data_url);
        self.http
            .get(&self.settings.data_url, &[], &Auth::Token(token))
            .await
    }

    async fn archive(
        &self,
        scope: &Scope,
        _selection: &Selection,
        download: Download,
    ) -> Result<Option<PathBuf>> {
        match self.kind {
            OpendataKind::Atoc => self.archive_atoc(scope, download).await,
            OpendataKind::Incidents => self.archive_incidents(scope, download).await,
        }
    }
}

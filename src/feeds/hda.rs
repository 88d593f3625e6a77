//! Historic Delay Attribution bundles listed in a public blob container.
//!
//! Names keep the provider's directory part (`2023-24/...zip`). Once repacked
//! a bundle is stored as `.tar{ext}`, so archived names are mapped back to
//! `.zip` before comparing with the listing. The mapping holds for any codec
//! the bundle was packed with, not only the one configured now.

use std::collections::HashSet;
use std::path::PathBuf;

use log::{debug, info};
use time::Date;

use crate::core::error::Result;
use crate::core::object::{ProviderKind, RemoteObject};
use crate::core::scope::{PathStyle, Scope};
use crate::feeds::{nested_target, FeedPolicy, FeedSource, Storage};
use crate::layout::ArchiveLayout;
use crate::reconcile::{select_unarchived, Selection};
use crate::storage::{scan_tree, stem, zip_name_for, ArchiveEntry};
use crate::transport::{parse_blob_listing, Auth, Download, HttpClient};

pub const DEFAULT_CONTAINER_URL: &str =
    "https://sacuksprodnrdigital0001.blob.core.windows.net/historic-delay-attribution";

pub struct HdaSource {
    name: String,
    policy: FeedPolicy,
    container_url: String,
    layout: ArchiveLayout,
    storage: Storage,
    http: HttpClient,
}

impl HdaSource {
    pub fn new(
        name: impl Into<String>,
        policy: FeedPolicy,
        container_url: impl Into<String>,
        storage: Storage,
        http: HttpClient,
    ) -> Self {
        let layout = ArchiveLayout::new(policy.archive_root.clone(), PathStyle::ZeroPadded);
        Self {
            name: name.into(),
            policy,
            container_url: container_url.into(),
            layout,
            storage,
            http,
        }
    }

    /// Listing names of everything already archived.
    pub fn archived_names(&self, archived: &[ArchiveEntry]) -> HashSet<String> {
        archived
            .iter()
            .flat_map(|entry| {
                let unpacked = zip_name_for(&entry.filename);
                std::iter::once(entry.filename.clone()).chain(unpacked)
            })
            .collect()
    }

    fn blob_url(&self, name: &str) -> String {
        format!("{}/{}", self.container_url.trim_end_matches('/'), name)
    }
}

impl FeedSource for HdaSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::HttpListing
    }

    fn policy(&self) -> &FeedPolicy {
        &self.policy
    }

    /// The listing is not date-scoped; the scope only feeds backup tokens
    /// and reports.
    fn default_scope(&self, today: Date) -> Scope {
        Scope::day_of(today)
    }

    async fn list(&self, _scope: &Scope) -> Result<Vec<RemoteObject>> {
        let query = [
            ("restype".to_string(), "container".to_string()),
            ("comp".to_string(), "list".to_string()),
        ];
        let xml = self.http.get_text(&self.container_url, &query).await?;
        let objects: Vec<RemoteObject> = parse_blob_listing(&xml)?
            .into_iter()
            .map(|blob| {
                let url = blob.url.unwrap_or_else(|| self.blob_url(&blob.name));
                RemoteObject::named(blob.name, Some(url))
            })
            .collect();
        debug!("{}: {} blobs listed", self.name, objects.len());
        Ok(objects)
    }

    fn archived(&self, _scope: &Scope) -> Result<Vec<ArchiveEntry>> {
        scan_tree(self.layout.root())
    }

    fn select(
        &self,
        _scope: &Scope,
        listed: &[RemoteObject],
        archived: &[ArchiveEntry],
    ) -> Result<Vec<Selection>> {
        let names = self.archived_names(archived);
        Ok(select_unarchived(listed, &names)
            .into_iter()
            .map(|object| Selection {
                stem: stem(&object.key).to_string(),
                archive_name: object.key.clone(),
                object,
            })
            .collect())
    }

    async fn fetch(&self, selection: &Selection) -> Result<Download> {
        let url = selection
            .object
            .url
            .clone()
            .unwrap_or_else(|| self.blob_url(&selection.object.key));
        info!("{}: getting {}", self.name, selection.archive_name);
        self.http.get(&url, &[], &Auth::None).await
    }

    async fn archive(
        &self,
        _scope: &Scope,
        selection: &Selection,
        download: Download,
    ) -> Result<Option<PathBuf>> {
        let (dir, filename) = nested_target(self.layout.root(), &selection.archive_name)?;
        let path = self.storage.archiver.store(download, &dir, &filename).await?;
        if filename.ends_with(".zip") && !self.storage.codec.is_none() {
            return Ok(Some(self.storage.archiver.repack(&path, self.storage.codec)?));
        }
        Ok(Some(path))
    }
}

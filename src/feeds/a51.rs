//! Public A51 rail archive: listed through anonymous S3, fetched over HTTPS.
//!
//! Objects live under `{key}{year}/{month}/` with an unpadded month and are
//! either daily `{day}.tbz2` bundles (bare day number) or date-prefixed
//! `YYYYMMDD*.xml.gz` files.

use std::path::PathBuf;

use log::info;
use time::Date;
use tokio::sync::OnceCell;

use crate::core::clock::yesterday;
use crate::core::error::Result;
use crate::core::object::{ProviderKind, RemoteObject};
use crate::core::scope::{PathStyle, Scope};
use crate::feeds::{FeedPolicy, FeedSource, Storage};
use crate::layout::{validate_component, ArchiveLayout};
use crate::reconcile::{archived_stems, NewObjectFilter, Selection};
use crate::storage::{extension, scan_dir, ArchiveEntry};
use crate::transport::{Auth, Download, HttpClient, S3Settings, S3Store};

pub const DEFAULT_BUCKET: &str = "cdn.area51.onl";
pub const DEFAULT_REGION: &str = "eu-west-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A51Settings {
    pub bucket: String,
    pub region: String,
    /// Key prefix ending in `/`, e.g. `archive/rail/trust/`.
    pub key: String,
    /// Only objects whose key contains `.{filetype}`.
    pub filetype: Option<String>,
}

pub struct A51Source {
    name: String,
    policy: FeedPolicy,
    settings: A51Settings,
    layout: ArchiveLayout,
    storage: Storage,
    http: HttpClient,
    s3: OnceCell<S3Store>,
}

impl A51Source {
    pub fn new(
        name: impl Into<String>,
        policy: FeedPolicy,
        settings: A51Settings,
        storage: Storage,
        http: HttpClient,
    ) -> Self {
        let layout = ArchiveLayout::new(policy.archive_root.clone(), PathStyle::StripZeros);
        Self {
            name: name.into(),
            policy,
            settings,
            layout,
            storage,
            http,
            s3: OnceCell::new(),
        }
    }

    /// Listing prefix for a month. The trailing `/` keeps month 1 from
    /// matching months 10 to 12.
    pub fn prefix(&self, scope: &Scope) -> String {
        format!(
            "{}{}/{}/",
            self.settings.key,
            scope.year_str(),
            scope.month_str(PathStyle::StripZeros)
        )
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.settings.bucket, key)
    }

    async fn store(&self) -> &S3Store {
        self.s3
            .get_or_init(|| async {
                let settings =
                    S3Settings::anonymous(self.settings.bucket.clone(), self.settings.region.clone());
                S3Store::connect(&settings).await
            })
            .await
    }
}

impl FeedSource for A51Source {
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
        Scope::month_of(yesterday(today))
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
        scan_dir(&self.layout.month_dir(scope))
    }

    fn select(
        &self,
        scope: &Scope,
        listed: &[RemoteObject],
        archived: &[ArchiveEntry],
    ) -> Result<Vec<Selection>> {
        Ok(NewObjectFilter.select(listed, &archived_stems(archived), scope))
    }

    async fn fetch(&self, selection: &Selection) -> Result<Download> {
        let url = self.object_url(&selection.object.key);
        info!("{}: getting {}", self.name, selection.archive_name);
        self.http.get(&url, &[], &Auth::None).await
    }

    async fn archive(
        &self,
        scope: &Scope,
        selection: &Selection,
        download: Download,
    ) -> Result<Option<PathBuf>> {
        let dir = self.layout.month_dir(scope);
        validate_component("filename", &selection.archive_name)?;
        let path = self
            .storage
            .archiver
            .store(download, &dir, &selection.archive_name)
            .await?;
        // .tbz2 bundles are already well compressed
        if extension(&selection.archive_name) == ".gz" && !self.storage.codec.is_none() {
            return Ok(Some(self.storage.archiver.recompress(&path, self.storage.codec, true)?));
        }
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Archiver, Codec};
    use tempfile::tempdir;

    fn source(root: &std::path::Path) -> A51Source {
        A51Source::new(
            "a51_trust",
            FeedPolicy::new("a51_trust", root),
            A51Settings {
                bucket: DEFAULT_BUCKET.to_string(),
                region: DEFAULT_REGION.to_string(),
                key: "archive/rail/trust/".to_string(),
                filetype: None,
            },
            Storage {
                archiver: Archiver::new(),
                codec: Codec::Xz,
            },
            HttpClient::new().expect("client"),
        )
    }

    #[test]
    fn prefix_is_unpadded_and_closed() {
        let dir = tempdir().expect("tempdir");
        let source = source(dir.path());
        let scope = Scope::new(2023, 1, None).expect("scope");
        assert_eq!(source.prefix(&scope), "archive/rail/trust/2023/1/");
        assert_eq!(
            source.object_url(&format!("{}3.tbz2", source.prefix(&scope))),
            "https://cdn.area51.onl/archive/rail/trust/2023/1/3.tbz2"
        );
    }

    #[test]
    fn default_scope_is_yesterdays_month() {
        let dir = tempdir().expect("tempdir");
        let source = source(dir.path());
        let today = time::macros::date!(2023 - 09 - 01);
        assert_eq!(
            source.default_scope(today),
            Scope::new(2023, 8, None).expect("scope")
        );
    }

    #[tokio::test]
    async fn archive_recompresses_gz_but_not_tbz2() {
        let dir = tempdir().expect("tempdir");
        let source = source(dir.path());
        let scope = Scope::new(2023, 8, None).expect("scope");
        let listed = vec![
            RemoteObject::named("archive/rail/trust/2023/8/3.tbz2", None),
            RemoteObject::named("archive/rail/trust/2023/8/20230815.xml.gz", None),
        ];
        let selections = source.select(&scope, &listed, &[]).expect("select");

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        std::io::Write::write_all(&mut gz, b"<trust/>").expect("write");
        let gz = gz.finish().expect("finish");

        let tbz2 = source
            .archive(&scope, &selections[0], Download::bytes(b"bz".to_vec()))
            .await
            .expect("archive")
            .expect("stored");
        let xml = source
            .archive(&scope, &selections[1], Download::bytes(gz))
            .await
            .expect("archive")
            .expect("stored");

        assert_eq!(tbz2, dir.path().join("2023/8/03.tbz2"));
        assert_eq!(xml, dir.path().join("2023/8/20230815.xml.xz"));

        let stems = archived_stems(&source.archived(&scope).expect("scan"));
        assert!(stems.contains("03"));
        assert!(stems.contains("20230815.xml"));
    }
}

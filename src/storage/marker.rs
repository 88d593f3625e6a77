use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::layout::validate_component;

/// The two-slot change record kept per feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    #[serde(rename = "oldfile")]
    pub old_file: String,
    #[serde(rename = "newfile")]
    pub new_file: String,
}

impl MarkerRecord {
    /// The new file, while it has not been seen as old yet.
    pub fn fresh(&self) -> Option<&str> {
        (self.new_file != self.old_file).then_some(self.new_file.as_str())
    }
}

/// Last content hash archived for a feed that republishes unchanged files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub last_hash: String,
}

/// File-backed store of change markers and hash records, one JSON file per
/// key under `root`.
///
/// Each write is atomic per key (temp file, fsync, rename). There is no
/// locking: two runs of the same feed must not overlap.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    root: PathBuf,
}

impl MarkerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, feed: &str) -> Result<Option<MarkerRecord>> {
        read_json(&self.marker_path(feed)?)
    }

    /// Shifts the current new file into the old slot and stores `new_path`
    /// as the new one. A feed seen for the first time starts from `("", "")`.
    pub fn record(&self, feed: &str, new_path: &Path) -> Result<MarkerRecord> {
        let previous = self.load(feed)?.unwrap_or_default();
        let record = MarkerRecord {
            old_file: previous.new_file,
            new_file: new_path.to_string_lossy().into_owned(),
        };
        write_json(&self.marker_path(feed)?, &record)?;
        info!("marker {feed}: {}", record.new_file);
        Ok(record)
    }

    /// The newest archived path if it has changed since the previous one.
    pub fn query(&self, feed: &str) -> Result<Option<String>> {
        Ok(self
            .load(feed)?
            .and_then(|record| record.fresh().map(str::to_string)))
    }

    /// Consumer-side reset: sets old to new so `query` stops reporting the
    /// current file. Returns whether there was a fresh change to clear.
    pub fn acknowledge(&self, feed: &str) -> Result<bool> {
        let Some(mut record) = self.load(feed)? else {
            return Ok(false);
        };
        if record.fresh().is_none() {
            return Ok(false);
        }
        record.old_file = record.new_file.clone();
        write_json(&self.marker_path(feed)?, &record)?;
        Ok(true)
    }

    pub fn load_hash(&self, feed: &str) -> Result<Option<HashRecord>> {
        read_json(&self.hash_path(feed)?)
    }

    pub fn store_hash(&self, feed: &str, hash: &str) -> Result<()> {
        let record = HashRecord {
            last_hash: hash.to_string(),
        };
        write_json(&self.hash_path(feed)?, &record)
    }

    fn marker_path(&self, feed: &str) -> Result<PathBuf> {
        self.key_path(feed, "lastfile")
    }

    fn hash_path(&self, feed: &str) -> Result<PathBuf> {
        self.key_path(feed, "hash")
    }

    fn key_path(&self, feed: &str, kind: &str) -> Result<PathBuf> {
        validate_component("feed", feed)?;
        Ok(self
            .root
            .join(format!("{}-{kind}.json", feed.replace('_', "-"))))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::archive("read_marker", path, err)),
    };
    let value = serde_json::from_slice(&data)
        .map_err(|err| Error::Corrupt(format!("{}: {err}", path.display())))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| Error::archive("create_dir", parent, err))?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value)?;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .map_err(|err| Error::archive("write_marker", &tmp, err))?;
    file.write_all(&data)
        .and_then(|_| file.sync_all())
        .map_err(|err| Error::archive("write_marker", &tmp, err))?;
    std::fs::rename(&tmp, path).map_err(|err| Error::archive("rename", path, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_marker_is_none() {
        let dir = tempdir().expect("tempdir");
        let store = MarkerStore::new(dir.path());
        assert_eq!(store.load("a51_trust").expect("load"), None);
        assert_eq!(store.query("a51_trust").expect("query"), None);
    }

    #[test]
    fn record_shifts_new_into_old() {
        let dir = tempdir().expect("tempdir");
        let store = MarkerStore::new(dir.path());

        let first = store.record("a51_trust", Path::new("/a/03.tbz2")).expect("record");
        assert_eq!(first.old_file, "");
        let second = store.record("a51_trust", Path::new("/a/04.tbz2")).expect("record");
        assert_eq!(second.old_file, "/a/03.tbz2");
        assert_eq!(second.new_file, "/a/04.tbz2");
        assert!(dir.path().join("a51-trust-lastfile.json").exists());
    }

    #[test]
    fn stale_change_persists_until_acknowledged() {
        let dir = tempdir().expect("tempdir");
        let store = MarkerStore::new(dir.path());
        store.record("atoc", Path::new("/a/RJTTF1.tar.xz")).expect("record");

        assert_eq!(
            store.query("atoc").expect("query").as_deref(),
            Some("/a/RJTTF1.tar.xz")
        );
        assert_eq!(
            store.query("atoc").expect("query").as_deref(),
            Some("/a/RJTTF1.tar.xz")
        );
        assert!(store.acknowledge("atoc").expect("ack"));
        assert_eq!(store.query("atoc").expect("query"), None);
        assert!(!store.acknowledge("atoc").expect("ack"));
    }

    #[test]
    fn malformed_marker_is_an_error() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("hda-lastfile.json"), b"{not json").expect("write");
        let store = MarkerStore::new(dir.path());
        assert!(matches!(store.load("hda"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn hash_records_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = MarkerStore::new(dir.path());
        assert_eq!(store.load_hash("data_corpus").expect("load"), None);
        store.store_hash("data_corpus", "abc123").expect("store");
        assert_eq!(
            store.load_hash("data_corpus").expect("load"),
            Some(HashRecord {
                last_hash: "abc123".to_string()
            })
        );
    }

    #[test]
    fn feed_names_cannot_escape_root() {
        let dir = tempdir().expect("tempdir");
        let store = MarkerStore::new(dir.path());
        assert!(store.record("../evil", Path::new("/x")).is_err());
    }
}

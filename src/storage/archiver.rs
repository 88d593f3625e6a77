use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;

use crate::core::error::{Error, Result};
use crate::storage::compression::{decoder_for_extension, Codec};
use crate::transport::{Body, Download};

const DIR_MODE: u32 = 0o755;

/// A file already present under a feed's archive directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name relative to the scanned directory, `/`-separated.
    pub filename: String,
    pub path: PathBuf,
}

impl ArchiveEntry {
    pub fn stem(&self) -> &str {
        stem(&self.filename)
    }
}

/// Name without its outermost extension.
pub fn stem(name: &str) -> &str {
    let base_start = name.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    match name[base_start..].rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..base_start + idx],
    }
}

/// Outermost extension including the dot, or `""`.
pub fn extension(name: &str) -> &str {
    &name[stem(name).len()..]
}

/// Writes fetched content into the archive tree and post-processes it.
///
/// Writes are idempotent at the filesystem level: the target is replaced via
/// a temporary sibling and a rename. Deciding whether a file should be fetched
/// at all is the caller's job.
#[derive(Debug, Clone, Default)]
pub struct Archiver {
    scratch_root: Option<PathBuf>,
}

impl Archiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory under which repack scratch directories are created
    /// (the system temp dir when unset).
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder
            .create(dir)
            .map_err(|err| Error::archive("create_dir", dir, err))
    }

    pub async fn store(&self, download: Download, dir: &Path, filename: &str) -> Result<PathBuf> {
        self.ensure_dir(dir)?;
        let dest = dir.join(filename);
        let tmp = tmp_path_for(&dest)?;
        let _ = std::fs::remove_file(&tmp);

        let written = write_body(download.body, &tmp).await;
        match written {
            Ok(bytes) => {
                publish(&tmp, &dest)?;
                debug!("archived {} ({} bytes)", dest.display(), bytes);
                Ok(dest)
            }
            Err(err) => {
                let _ = std::fs::remove_file(&tmp);
                Err(err)
            }
        }
    }

    pub fn store_bytes(&self, bytes: &[u8], dir: &Path, filename: &str) -> Result<PathBuf> {
        self.ensure_dir(dir)?;
        let dest = dir.join(filename);
        let tmp = tmp_path_for(&dest)?;
        let mut file = create(&tmp)?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|err| Error::archive("write", &tmp, err))?;
        publish(&tmp, &dest)?;
        Ok(dest)
    }

    /// Stores `text` gzip-compressed under `filename`.
    pub fn store_gzip_text(&self, text: &str, dir: &Path, filename: &str) -> Result<PathBuf> {
        self.ensure_dir(dir)?;
        let dest = dir.join(filename);
        let tmp = tmp_path_for(&dest)?;
        let file = create(&tmp)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(text.as_bytes())
            .and_then(|_| encoder.finish())
            .and_then(|file| file.sync_all())
            .map_err(|err| Error::archive("write_gzip", &tmp, err))?;
        publish(&tmp, &dest)?;
        Ok(dest)
    }

    /// Re-encodes `path` with `codec` and removes the original.
    ///
    /// With `strip_extension` the source is first decompressed according to
    /// its extension (`x.gz` becomes `x.xz`, `d.tbz2` becomes `d.tar.xz`);
    /// otherwise the file is compressed as-is (`x.csv` becomes `x.csv.xz`).
    pub fn recompress(&self, path: &Path, codec: Codec, strip_extension: bool) -> Result<PathBuf> {
        if codec.is_none() {
            return Ok(path.to_path_buf());
        }
        let name = file_name(path)?;
        let (decoder, new_name) = if strip_extension {
            let ext = extension(&name);
            let (decoder, suffix) = decoder_for_extension(ext).ok_or_else(|| {
                Error::config(format!("no decompressor for extension '{ext}' of {name}"))
            })?;
            (
                decoder,
                format!("{}{}{}", stem(&name), suffix, codec.extension()),
            )
        } else {
            (Codec::None, format!("{name}{}", codec.extension()))
        };

        let dest = path.with_file_name(&new_name);
        let tmp = tmp_path_for(&dest)?;
        let _ = std::fs::remove_file(&tmp);

        let result = transcode(path, &tmp, decoder, codec);
        if let Err(err) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        publish(&tmp, &dest)?;
        if dest != path {
            std::fs::remove_file(path).map_err(|err| Error::archive("remove_source", path, err))?;
        }
        debug!("recompressed {} -> {}", path.display(), dest.display());
        Ok(dest)
    }
}

/// Files directly inside `dir`; a missing directory yields nothing.
pub fn scan_dir(dir: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    if !dir.exists() {
        return Ok(entries);
    }
    let listing = std::fs::read_dir(dir).map_err(|err| Error::archive("scan", dir, err))?;
    for entry in listing {
        let entry = entry.map_err(|err| Error::archive("scan", dir, err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if filename.ends_with(".tmp") {
            continue;
        }
        entries.push(ArchiveEntry {
            filename: filename.to_string(),
            path: path.clone(),
        });
    }
    entries.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(entries)
}

/// Every file below `root`, named relative to it.
pub fn scan_tree(root: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    if !root.exists() {
        return Ok(entries);
    }
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            Error::archive("scan_tree", &path, err.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let filename = relative
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if filename.ends_with(".tmp") {
            continue;
        }
        entries.push(ArchiveEntry {
            filename,
            path: entry.path().to_path_buf(),
        });
    }
    Ok(entries)
}

async fn write_body(body: Body, tmp: &Path) -> Result<u64> {
    let file = create(tmp)?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;
    match body {
        Body::Bytes(bytes) => {
            writer
                .write_all(&bytes)
                .map_err(|err| Error::archive("write", tmp, err))?;
            total = bytes.len() as u64;
        }
        Body::Stream(mut response) => {
            while let Some(chunk) = response.chunk().await? {
                writer
                    .write_all(&chunk)
                    .map_err(|err| Error::archive("write", tmp, err))?;
                total += chunk.len() as u64;
            }
        }
    }
    let file = writer
        .into_inner()
        .map_err(|err| Error::archive("flush", tmp, err.into_error()))?;
    file.sync_all()
        .map_err(|err| Error::archive("sync", tmp, err))?;
    Ok(total)
}

fn transcode(src: &Path, dest: &Path, decoder: Codec, encoder: Codec) -> Result<()> {
    let input = File::open(src).map_err(|err| Error::archive("open", src, err))?;
    let mut reader = decoder
        .decoder(BufReader::new(input))
        .map_err(|err| Error::archive("decode", src, err))?;
    let output = create(dest)?;
    let mut writer = encoder
        .encoder(BufWriter::new(output))
        .map_err(|err| Error::archive("encode", dest, err))?;
    std::io::copy(&mut reader, &mut writer).map_err(|err| Error::archive("transcode", src, err))?;
    let buffered = writer
        .finish()
        .map_err(|err| Error::archive("encode", dest, err))?;
    let file = buffered
        .into_inner()
        .map_err(|err| Error::archive("flush", dest, err.into_error()))?;
    file.sync_all()
        .map_err(|err| Error::archive("sync", dest, err))?;
    Ok(())
}

pub(crate) fn create(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|err| Error::archive("create", path, err))
}

pub(crate) fn publish(tmp: &Path, dest: &Path) -> Result<()> {
    std::fs::rename(tmp, dest).map_err(|err| Error::archive("rename", dest, err))
}

pub(crate) fn tmp_path_for(path: &Path) -> Result<PathBuf> {
    let name = file_name(path)?;
    Ok(path.with_file_name(format!("{name}.tmp")))
}

pub(crate) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Corrupt(format!("missing filename for {}", path.display())))
}

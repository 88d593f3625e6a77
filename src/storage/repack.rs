//! Zip to compressed-tar repackaging.
//!
//! Providers publish multi-file bundles as zip archives. The archive keeps
//! them as a single `{stem}.tar{ext}` in the configured codec instead.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use log::debug;
use zip::ZipArchive;

use crate::core::error::{Error, Result};
use crate::storage::archiver::{create, file_name, publish, stem, tmp_path_for, Archiver};
use crate::storage::compression::Codec;

const PACKED_CODECS: [Codec; 4] = [Codec::Xz, Codec::Gzip, Codec::Bzip2, Codec::Zstd];

/// Every name the zip `zip_name` can carry once repacked, one per codec.
pub fn repacked_names(zip_name: &str) -> impl Iterator<Item = String> + '_ {
    let base = stem(zip_name);
    PACKED_CODECS
        .iter()
        .map(move |codec| format!("{base}.tar{}", codec.extension()))
}

/// The zip a `{base}.tar{ext}` was repacked from, whatever codec packed it.
pub fn zip_name_for(packed: &str) -> Option<String> {
    PACKED_CODECS.iter().find_map(|codec| {
        packed
            .strip_suffix(codec.extension())
            .and_then(|rest| rest.strip_suffix(".tar"))
            .filter(|base| !base.is_empty() && !base.ends_with('/'))
            .map(|base| format!("{base}.zip"))
    })
}

impl Archiver {
    /// Unpacks the zip at `archive` into a scratch directory, packs the
    /// contents into `{stem}.tar{codec ext}` beside it, then deletes the zip.
    ///
    /// The scratch directory is removed on every path out of this function,
    /// including failures part-way through extraction or packing. On failure
    /// the original zip is left untouched.
    pub fn repack(&self, archive: &Path, codec: Codec) -> Result<PathBuf> {
        let scratch_root = self.scratch_root();
        self.ensure_dir(&scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("railcron-repack-")
            .tempdir_in(&scratch_root)
            .map_err(|err| Error::archive("create_scratch", &scratch_root, err))?;

        extract_zip(archive, scratch.path())?;

        let name = file_name(archive)?;
        let dest = archive.with_file_name(format!("{}.tar{}", stem(&name), codec.extension()));
        let tmp = tmp_path_for(&dest)?;
        if let Err(err) = write_tar(scratch.path(), &tmp, codec) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        publish(&tmp, &dest)?;
        std::fs::remove_file(archive)
            .map_err(|err| Error::archive("remove_source", archive, err))?;

        let scratch_path = scratch.path().to_path_buf();
        scratch
            .close()
            .map_err(|err| Error::archive("remove_scratch", &scratch_path, err))?;
        debug!("repacked {} -> {}", archive.display(), dest.display());
        Ok(dest)
    }
}

fn extract_zip(source: &Path, target: &Path) -> Result<()> {
    let file = File::open(source).map_err(|err| Error::archive("extract_zip.open", source, err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| zip_error(source, err))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| zip_error(source, err))?;
        let entry_path = sanitize_entry(entry.name())?;
        let destination = target.join(&entry_path);

        if entry.is_dir() {
            std::fs::create_dir_all(&destination)
                .map_err(|err| Error::archive("extract_zip.create_dir", &destination, err))?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| Error::archive("extract_zip.create_parent", parent, err))?;
        }
        let mut output = File::create(&destination)
            .map_err(|err| Error::archive("extract_zip.create_file", &destination, err))?;
        io::copy(&mut entry, &mut output)
            .map_err(|err| Error::archive("extract_zip.copy", &destination, err))?;
    }
    Ok(())
}

fn sanitize_entry(entry: &str) -> Result<PathBuf> {
    let path = Path::new(entry);
    if path.is_absolute() {
        return Err(Error::Corrupt(format!("absolute zip entry: {entry}")));
    }
    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => return Err(Error::Corrupt(format!("invalid zip entry: {entry}"))),
        }
    }
    if sanitized.as_os_str().is_empty() {
        return Err(Error::Corrupt(format!("empty zip entry: {entry:?}")));
    }
    Ok(sanitized)
}

fn write_tar(source_dir: &Path, dest: &Path, codec: Codec) -> Result<()> {
    let output = create(dest)?;
    let encoder = codec
        .encoder(BufWriter::new(output))
        .map_err(|err| Error::archive("tar.encode", dest, err))?;
    let mut builder = tar::Builder::new(encoder);

    let mut children = Vec::new();
    let listing =
        std::fs::read_dir(source_dir).map_err(|err| Error::archive("tar.scan", source_dir, err))?;
    for entry in listing {
        let entry = entry.map_err(|err| Error::archive("tar.scan", source_dir, err))?;
        children.push(entry.path());
    }
    children.sort();

    for child in children {
        let Some(name) = child.file_name() else {
            continue;
        };
        let appended = if child.is_dir() {
            builder.append_dir_all(name, &child)
        } else {
            builder.append_path_with_name(&child, name)
        };
        appended.map_err(|err| Error::archive("tar.append", &child, err))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|err| Error::archive("tar.finish", dest, err))?;
    let buffered = encoder
        .finish()
        .map_err(|err| Error::archive("tar.encode", dest, err))?;
    let file = buffered
        .into_inner()
        .map_err(|err| Error::archive("tar.flush", dest, err.into_error()))?;
    file.sync_all()
        .map_err(|err| Error::archive("tar.sync", dest, err))?;
    Ok(())
}

fn zip_error(path: &Path, err: zip::result::ZipError) -> Error {
    Error::Corrupt(format!("zip {}: {err}", path.display()))
}

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use tempfile::tempdir;
use zip::write::FileOptions;
use zip::ZipWriter;

use railcron::storage::{Archiver, Codec};

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(path)?);
    for (name, body) in entries {
        zip.start_file(*name, FileOptions::default())?;
        zip.write_all(body)?;
    }
    zip.finish()?;
    Ok(())
}

fn scratch_is_empty(scratch: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(scratch)?.next().is_none())
}

#[test]
fn repack_replaces_zip_and_removes_scratch() -> Result<()> {
    let temp = tempdir()?;
    let scratch = temp.path().join("scratch");
    let month = temp.path().join("atoc/2023/08");
    std::fs::create_dir_all(&month)?;
    let zip_path = month.join("ttisf459.zip");
    write_zip(
        &zip_path,
        &[("ttisf459.mca", b"HD timetable"), ("ttisf459.msn", b"A station")],
    )?;

    let archiver = Archiver::new().with_scratch_root(&scratch);
    let packed = archiver.repack(&zip_path, Codec::Gzip)?;

    assert_eq!(packed, month.join("ttisf459.tar.gz"));
    assert!(packed.exists());
    assert!(!zip_path.exists());
    assert!(scratch_is_empty(&scratch)?);
    Ok(())
}

#[test]
fn failed_repack_keeps_zip_and_removes_scratch() -> Result<()> {
    let temp = tempdir()?;
    let scratch = temp.path().join("scratch");
    let zip_path = temp.path().join("bundle.zip");
    write_zip(
        &zip_path,
        &[("ok.csv", b"a,b"), ("../escape.csv", b"c,d")],
    )?;

    let archiver = Archiver::new().with_scratch_root(&scratch);
    assert!(archiver.repack(&zip_path, Codec::Xz).is_err());

    assert!(zip_path.exists());
    assert!(!temp.path().join("bundle.tar.xz").exists());
    assert!(!temp.path().join("escape.csv").exists());
    assert!(scratch_is_empty(&scratch)?);
    Ok(())
}

#[test]
fn truncated_zip_removes_scratch() -> Result<()> {
    let temp = tempdir()?;
    let scratch = temp.path().join("scratch");
    let zip_path = temp.path().join("broken.zip");
    std::fs::write(&zip_path, b"PK\x03\x04 not really a zip")?;

    let archiver = Archiver::new().with_scratch_root(&scratch);
    assert!(archiver.repack(&zip_path, Codec::Bzip2).is_err());
    assert!(scratch_is_empty(&scratch)?);
    Ok(())
}

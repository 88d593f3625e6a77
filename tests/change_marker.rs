use std::path::Path;

use anyhow::Result;
use tempfile::tempdir;

use railcron::storage::MarkerStore;

#[test]
fn first_record_is_fresh() -> Result<()> {
    let temp = tempdir()?;
    let markers = MarkerStore::new(temp.path());

    assert_eq!(markers.query("a51_trust")?, None);
    markers.record("a51_trust", Path::new("/data/trust/2023/8/15.tbz2"))?;

    assert_eq!(
        markers.query("a51_trust")?.as_deref(),
        Some("/data/trust/2023/8/15.tbz2")
    );
    assert!(temp.path().join("a51-trust-lastfile.json").exists());
    Ok(())
}

#[test]
fn recording_the_same_path_twice_settles() -> Result<()> {
    let temp = tempdir()?;
    let markers = MarkerStore::new(temp.path());
    markers.record("hda", Path::new("/data/hda/a.csv"))?;
    let before = markers.load("hda")?.unwrap_or_default();

    let path = Path::new("/data/hda/b.csv");
    markers.record("hda", path)?;
    let after_first = markers.load("hda")?.unwrap_or_default();
    markers.record("hda", path)?;
    let after_second = markers.load("hda")?.unwrap_or_default();

    assert_ne!(after_second.new_file, before.new_file);
    assert_eq!(after_second.new_file, after_first.new_file);
    assert_eq!(markers.query("hda")?, None);
    Ok(())
}

#[test]
fn marker_stays_fresh_until_acknowledged() -> Result<()> {
    let temp = tempdir()?;
    let markers = MarkerStore::new(temp.path());
    markers.record("atoc", Path::new("/data/atoc/2023/08/ttis123.tar.xz"))?;

    // Later runs with nothing new leave the marker alone.
    assert!(markers.query("atoc")?.is_some());
    assert!(markers.query("atoc")?.is_some());

    assert!(markers.acknowledge("atoc")?);
    assert_eq!(markers.query("atoc")?, None);
    assert!(!markers.acknowledge("atoc")?);
    Ok(())
}

#[test]
fn malformed_marker_is_an_error_not_missing() -> Result<()> {
    let temp = tempdir()?;
    std::fs::write(temp.path().join("sched-full-lastfile.json"), b"{not json")?;
    let markers = MarkerStore::new(temp.path());

    assert!(markers.load("sched_full").is_err());
    assert!(markers.load("sched_other")?.is_none());
    Ok(())
}

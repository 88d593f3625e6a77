use std::collections::HashSet;

use anyhow::Result;
use time::macros::datetime;

use railcron::core::{RemoteObject, Scope};
use railcron::reconcile::{archive_filename, normalize_stem, DateExactFilter, NewObjectFilter};

const PREFIX: &str = "archive/rail/trust/2023/8/";

fn listing(names: &[&str]) -> Vec<RemoteObject> {
    names
        .iter()
        .map(|name| RemoteObject::named(format!("{PREFIX}{name}"), None))
        .collect()
}

fn stems(values: &[&str]) -> HashSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn month_scope_skips_archived_and_pads_single_digit_days() -> Result<()> {
    let objects = listing(&["3.tbz2", "04.tbz2", "20230815.xml.gz"]);
    let scope = Scope::new(2023, 8, None)?;

    let selected = NewObjectFilter.select(&objects, &stems(&["04"]), &scope);

    let names: Vec<&str> = selected.iter().map(|s| s.archive_name.as_str()).collect();
    assert_eq!(names, vec!["03.tbz2", "20230815.xml.gz"]);
    assert_eq!(selected[0].stem, "03");
    assert_eq!(selected[0].object.key, format!("{PREFIX}3.tbz2"));
    Ok(())
}

#[test]
fn day_scope_keeps_matching_numeric_and_dated_stems() -> Result<()> {
    let objects = listing(&["14.tbz2", "15.tbz2", "20230815_extra.xml.gz"]);
    let scope = Scope::new(2023, 8, Some(15))?;

    let selected = NewObjectFilter.select(&objects, &HashSet::new(), &scope);

    let chosen: Vec<&str> = selected.iter().map(|s| s.stem.as_str()).collect();
    assert_eq!(chosen, vec!["15", "20230815_extra.xml"]);
    Ok(())
}

#[test]
fn stored_name_is_found_by_the_next_scan() {
    for day in 1..10 {
        let remote = format!("{day}.tbz2");
        let stored = archive_filename(&remote);
        assert_eq!(stored, format!("{day:02}.tbz2"));
        assert_eq!(normalize_stem(&day.to_string()), format!("{day:02}"));

        let objects = listing(&[remote.as_str()]);
        let archived = stems(&[&format!("{day:02}")]);
        let scope = Scope::new(2023, 8, None).expect("scope");
        assert!(NewObjectFilter.select(&objects, &archived, &scope).is_empty());
    }
}

#[test]
fn fully_archived_listing_selects_nothing() -> Result<()> {
    let objects = listing(&["1.tbz2", "02.tbz2", "20230803.xml.gz", "20230803_b.xml.gz"]);
    let archived = stems(&["01", "02", "20230803.xml", "20230803_b.xml", "extra"]);
    let scope = Scope::new(2023, 8, None)?;

    assert!(NewObjectFilter.select(&objects, &archived, &scope).is_empty());
    Ok(())
}

#[test]
fn date_exact_filter_drops_objects_a_day_off() -> Result<()> {
    let objects = vec![
        RemoteObject::new("logs/2023/202308/20230815-0001.log", datetime!(2023-08-15 23:59 UTC), 10),
        RemoteObject::new("logs/2023/202308/20230815-0002.log", datetime!(2023-08-16 00:01 UTC), 10),
        RemoteObject::new("logs/2023/202308/20230814-2359.log", datetime!(2023-08-14 12:00 UTC), 10),
    ];
    let scope = Scope::new(2023, 8, Some(15))?;

    let kept = DateExactFilter.select(&objects, &scope)?;

    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].key, "logs/2023/202308/20230815-0001.log");
    Ok(())
}

#[test]
fn date_exact_filter_needs_a_day() -> Result<()> {
    let scope = Scope::new(2023, 8, None)?;
    assert!(DateExactFilter.select(&[], &scope).is_err());
    Ok(())
}

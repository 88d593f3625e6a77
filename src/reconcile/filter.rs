//! New-object detection: which listed objects still need fetching.
//!
//! Two policies exist and stay separate. [`NewObjectFilter`] compares names
//! against what is already archived and never looks at modification times,
//! because archive-style providers stamp objects a day or more after the date
//! they describe. [`DateExactFilter`] is for same-day logs whose timestamps
//! are reliable and keeps only objects modified on the scope's day.

use std::collections::HashSet;

use log::debug;
use time::UtcOffset;

use crate::core::error::Result;
use crate::core::object::RemoteObject;
use crate::core::scope::Scope;
use crate::storage::{stem, ArchiveEntry};

/// A listed object accepted for fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub object: RemoteObject,
    /// Normalized stem, the "already archived" key.
    pub stem: String,
    /// Filename to archive under; carries the normalized stem.
    pub archive_name: String,
}

/// Zero-pads bare single-digit day stems (`3` becomes `03`). Anything else
/// is returned unchanged.
pub fn normalize_stem(stem: &str) -> String {
    if stem.len() == 1 && is_numeric(stem) {
        format!("{stem:0>2}")
    } else {
        stem.to_string()
    }
}

/// The name an object is stored under: its basename with the stem
/// normalized, so the next scan finds it under the same key.
pub fn archive_filename(basename: &str) -> String {
    let raw_stem = stem(basename);
    format!("{}{}", normalize_stem(raw_stem), &basename[raw_stem.len()..])
}

/// Stems of already archived files, the membership set for
/// [`NewObjectFilter::select`].
pub fn archived_stems(entries: &[ArchiveEntry]) -> HashSet<String> {
    entries
        .iter()
        .map(|entry| normalize_stem(entry.stem()))
        .collect()
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NewObjectFilter;

impl NewObjectFilter {
    /// Objects not yet archived, restricted to the scope's day when one is
    /// set. Listing order is kept.
    pub fn select(
        &self,
        objects: &[RemoteObject],
        archived: &HashSet<String>,
        scope: &Scope,
    ) -> Vec<Selection> {
        let day_prefix = scope.compact_date();
        let mut selected = Vec::new();

        for object in objects {
            let basename = object.basename();
            let raw_stem = stem(basename);
            let normalized = normalize_stem(raw_stem);

            if archived.contains(&normalized) {
                debug!("{basename}: already archived");
                continue;
            }

            if let (Some(day), Some(prefix)) = (scope.day, day_prefix.as_deref()) {
                let wanted = if is_numeric(raw_stem) {
                    raw_stem.parse::<u32>().ok() == Some(u32::from(day))
                } else {
                    raw_stem.starts_with(prefix)
                };
                if !wanted {
                    continue;
                }
            }

            selected.push(Selection {
                object: object.clone(),
                archive_name: archive_filename(basename),
                stem: normalized,
            });
        }
        selected
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateExactFilter;

impl DateExactFilter {
    /// Objects whose UTC modification date is exactly the scope's day.
    pub fn select(&self, objects: &[RemoteObject], scope: &Scope) -> Result<Vec<RemoteObject>> {
        scope.require_day()?;
        Ok(objects
            .iter()
            .filter(|object| scope.matches_date(object.last_modified.to_offset(UtcOffset::UTC).date()))
            .cloned()
            .collect())
    }
}

/// Listing entries whose full name has not been archived yet.
pub fn select_unarchived(objects: &[RemoteObject], archived: &HashSet<String>) -> Vec<RemoteObject> {
    objects
        .iter()
        .filter(|object| !archived.contains(&object.key))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn named(keys: &[&str]) -> Vec<RemoteObject> {
        keys.iter()
            .map(|key| RemoteObject::named(format!("archive/rail/trust/2023/8/{key}"), None))
            .collect()
    }

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn normalize_pads_single_digits_only() {
        assert_eq!(normalize_stem("3"), "03");
        assert_eq!(normalize_stem("0"), "00");
        assert_eq!(normalize_stem("04"), "04");
        assert_eq!(normalize_stem("15"), "15");
        assert_eq!(normalize_stem("a"), "a");
        assert_eq!(normalize_stem("20230815.xml"), "20230815.xml");
    }

    #[test]
    fn archive_filename_uses_normalized_stem() {
        assert_eq!(archive_filename("3.tbz2"), "03.tbz2");
        assert_eq!(archive_filename("20230815.xml.gz"), "20230815.xml.gz");
    }

    #[test]
    fn month_scope_catches_up_everything_new() {
        let scope = Scope::new(2023, 8, None).expect("scope");
        let objects = named(&["3.tbz2", "04.tbz2", "20230815.xml.gz"]);

        let selected = NewObjectFilter.select(&objects, &set(&["04"]), &scope);

        let names: Vec<&str> = selected.iter().map(|s| s.archive_name.as_str()).collect();
        assert_eq!(names, vec!["03.tbz2", "20230815.xml.gz"]);
        assert_eq!(selected[0].stem, "03");
    }

    #[test]
    fn normalized_single_digit_is_not_refetched() {
        let scope = Scope::new(2023, 8, None).expect("scope");
        let objects = named(&["3.tbz2"]);
        assert!(NewObjectFilter.select(&objects, &set(&["03"]), &scope).is_empty());
    }

    #[test]
    fn day_scope_accepts_matching_day_and_date_prefix() {
        let scope = Scope::new(2023, 8, Some(15)).expect("scope");
        let objects = named(&["14.tbz2", "15.tbz2", "20230815_extra.xml.gz", "20230814_x.xml.gz"]);

        let selected = NewObjectFilter.select(&objects, &HashSet::new(), &scope);

        let stems: Vec<&str> = selected.iter().map(|s| s.stem.as_str()).collect();
        assert_eq!(stems, vec!["15", "20230815_extra.xml"]);
    }

    #[test]
    fn day_scope_matches_unpadded_day() {
        let scope = Scope::new(2023, 8, Some(3)).expect("scope");
        let objects = named(&["3.tbz2", "03.tbz2", "13.tbz2"]);
        let selected = NewObjectFilter.select(&objects, &HashSet::new(), &scope);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|s| s.stem == "03"));
    }

    #[test]
    fn date_exact_filter_rejects_neighbouring_days() {
        let scope = Scope::new(2023, 8, Some(15)).expect("scope");
        let objects = vec![
            RemoteObject::new("logs/20230815_PP.log.gz", datetime!(2023-08-14 23:59:59 UTC), 1),
            RemoteObject::new("logs/20230815_PP2.log.gz", datetime!(2023-08-15 08:30:02 UTC), 1),
            RemoteObject::new("logs/20230815_PP3.log.gz", datetime!(2023-08-16 00:00:00 UTC), 1),
        ];

        let kept = DateExactFilter.select(&objects, &scope).expect("select");

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "logs/20230815_PP2.log.gz");
    }

    #[test]
    fn date_exact_filter_needs_a_day() {
        let scope = Scope::new(2023, 8, None).expect("scope");
        assert!(DateExactFilter.select(&[], &scope).is_err());
    }

    #[test]
    fn unarchived_names_compare_full_keys() {
        let objects = vec![
            RemoteObject::named("2023-24/P01.zip", None),
            RemoteObject::named("2023-24/P02.zip", None),
        ];
        let kept = select_unarchived(&objects, &set(&["2023-24/P01.zip"]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "2023-24/P02.zip");
    }
}

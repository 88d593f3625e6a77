mod archiver;
pub mod compression;
mod marker;
mod repack;

pub use archiver::{extension, scan_dir, scan_tree, stem, ArchiveEntry, Archiver};
pub use compression::{decoder_for_extension, Codec};
pub use marker::{HashRecord, MarkerRecord, MarkerStore};
pub use repack::{repacked_names, zip_name_for};

mod coordinator;
mod filter;

pub use coordinator::{failure_report, RunCoordinator, RunOutcome, RunPhase};
pub use filter::{
    archive_filename, archived_stems, normalize_stem, select_unarchived, DateExactFilter,
    NewObjectFilter, Selection,
};

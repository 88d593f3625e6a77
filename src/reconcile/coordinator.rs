use std::fmt;
use std::path::PathBuf;

use log::{debug, error, info, warn};

use crate::backup::Backup;
use crate::core::clock::Clock;
use crate::core::error::{Error, Result};
use crate::core::object::ProviderKind;
use crate::core::scope::{Scope, ScopeOverride};
use crate::feeds::{FailurePolicy, FeedSource};
use crate::notify::Notifier;
use crate::reconcile::Selection;
use crate::storage::MarkerStore;

/// Step a run was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Start,
    Listing,
    Filtering,
    Fetching,
    Archiving,
    Backup,
    Marking,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Start => "start",
            RunPhase::Listing => "listing",
            RunPhase::Filtering => "filtering",
            RunPhase::Fetching => "fetching",
            RunPhase::Archiving => "archiving",
            RunPhase::Backup => "backup",
            RunPhase::Marking => "marking",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// New files were archived and the marker now points at `marker`.
    Archived { files: Vec<PathBuf>, marker: PathBuf },
    /// Nothing new; the marker was left alone.
    NoOp,
    /// The run failed, was reported, and the feed swallows errors.
    Failed { phase: RunPhase, message: String },
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Drives one feed through list, filter, fetch, archive, backup and mark.
///
/// Fetches run one at a time and the first failure ends the run; the marker
/// keeps its previous value in that case. Two runs of the same feed must not
/// overlap: the marker store is not locked.
pub struct RunCoordinator<N, B, C> {
    markers: MarkerStore,
    notifier: N,
    backup: B,
    clock: C,
}

impl<N: Notifier, B: Backup, C: Clock> RunCoordinator<N, B, C> {
    pub fn new(markers: MarkerStore, notifier: N, backup: B, clock: C) -> Self {
        Self {
            markers,
            notifier,
            backup,
            clock,
        }
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub async fn run<S: FeedSource>(&self, source: &S, scope: ScopeOverride) -> Result<RunOutcome> {
        let default_scope = source.default_scope(self.clock.today());
        let resolved = match scope.resolve(default_scope) {
            Ok(resolved) => resolved,
            Err(err) => return self.fail(source, &default_scope, RunPhase::Start, err).await,
        };

        let mut phase = RunPhase::Start;
        match self.execute(source, &resolved, &mut phase).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => self.fail(source, &resolved, phase, err).await,
        }
    }

    async fn fail<S: FeedSource>(
        &self,
        source: &S,
        scope: &Scope,
        phase: RunPhase,
        err: Error,
    ) -> Result<RunOutcome> {
        error!("{}: {phase} failed: {err}", source.name());
        self.report(source, scope, phase, &err).await;
        match source.policy().on_failure {
            FailurePolicy::Reraise => Err(err),
            FailurePolicy::Swallow => Ok(RunOutcome::Failed {
                phase,
                message: err.to_string(),
            }),
        }
    }

    async fn execute<S: FeedSource>(
        &self,
        source: &S,
        scope: &Scope,
        phase: &mut RunPhase,
    ) -> Result<RunOutcome> {
        let name = source.name();
        info!("{}", source.identity(*scope));

        let selections: Vec<Selection> = match source.kind() {
            ProviderKind::SingleUrl => source.single_object(scope).into_iter().collect(),
            ProviderKind::HttpListing | ProviderKind::S3 => {
                *phase = RunPhase::Listing;
                let listed = source.list(scope).await?;
                debug!("{name}: {} objects listed", listed.len());

                *phase = RunPhase::Filtering;
                let archived = source.archived(scope)?;
                debug!("{name}: {} files already archived", archived.len());
                source.select(scope, &listed, &archived)?
            }
        };
        if selections.is_empty() {
            info!("{name}: nothing new for {scope}");
            return Ok(RunOutcome::NoOp);
        }

        let mut files = Vec::new();
        for selection in &selections {
            *phase = RunPhase::Fetching;
            let download = source.fetch(selection).await?;

            *phase = RunPhase::Archiving;
            match source.archive(scope, selection, download).await? {
                Some(path) => {
                    info!("{name}: archived {}", path.display());
                    files.push(path);
                }
                None => debug!("{name}: {} discarded", selection.archive_name),
            }
        }
        let Some(last) = files.last().cloned() else {
            info!("{name}: nothing new for {scope}");
            return Ok(RunOutcome::NoOp);
        };

        let policy = source.policy();
        if let Some(template) = policy.rsync.as_deref() {
            *phase = RunPhase::Backup;
            self.backup
                .sync(&policy.archive_root, template, self.clock.today())
                .await?;
        }

        *phase = RunPhase::Marking;
        self.markers.record(&policy.marker, &last)?;
        info!("{name}: got new file {}", last.display());
        Ok(RunOutcome::Archived {
            files,
            marker: last,
        })
    }

    async fn report<S: FeedSource>(&self, source: &S, scope: &Scope, phase: RunPhase, err: &Error) {
        let subject = format!("Error in flow {}", source.name());
        let body = failure_report(source.name(), scope, phase, err);
        if let Err(notify_err) = self.notifier.notify(source.name(), &subject, &body).await {
            warn!("{}: could not send failure report: {notify_err}", source.name());
        }
    }
}

/// Plain-text failure report: feed, scope, phase and the error chain.
pub fn failure_report(feed: &str, scope: &Scope, phase: RunPhase, err: &Error) -> String {
    let mut body = format!(
        "feed: {feed}\nscope: {scope}\nphase: {phase}\nkind: {}\nerror: {err}\n",
        err.kind()
    );
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        body.push_str(&format!("caused by: {cause}\n"));
        source = cause.source();
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn report_lists_error_chain() {
        let scope = Scope::new(2023, 8, Some(15)).expect("scope");
        let err = Error::archive(
            "write",
            Path::new("/data/x"),
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        let body = failure_report("a51_trust", &scope, RunPhase::Archiving, &err);
        assert!(body.contains("feed: a51_trust"));
        assert!(body.contains("scope: 2023-08-15"));
        assert!(body.contains("phase: archiving"));
        assert!(body.contains("caused by: disk full"));
    }
}

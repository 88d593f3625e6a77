//! The set of configured feeds, built once at startup and passed to whatever
//! runs them.

use std::collections::HashSet;
use std::sync::Arc;

use log::{error, info};

use crate::backup::{Backup, RsyncBackup};
use crate::config::{FeedConfig, FeedSpec, RailcronConfig, Settings};
use crate::core::clock::Clock;
use crate::core::error::{Error, Result};
use crate::core::scope::ScopeOverride;
use crate::feeds::a51::A51Settings;
use crate::feeds::datafeeds::DatafeedsSettings;
use crate::feeds::nrdp::NrdpSettings;
use crate::feeds::opendata::OpendataSettings;
use crate::feeds::{
    A51Source, DatafeedsSource, Family, FeedSource, HdaSource, NrdpSource, OpendataSource, Source,
    Storage,
};
use crate::notify::{Mailer, Notifier};
use crate::reconcile::{RunCoordinator, RunOutcome};
use crate::storage::{Archiver, MarkerStore};
use crate::transport::{HttpClient, S3Settings};

/// Feeds by name, in configuration order.
pub struct FeedRegistry<S = Source> {
    feeds: Vec<S>,
}

impl<S: FeedSource> FeedRegistry<S> {
    pub fn new(feeds: Vec<S>) -> Result<Self> {
        let mut seen = HashSet::new();
        for feed in &feeds {
            if !seen.insert(feed.name().to_string()) {
                return Err(Error::config(format!("feed {} is defined twice", feed.name())));
            }
        }
        Ok(Self { feeds })
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.feeds.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.feeds.iter().map(|feed| feed.name()).collect()
    }

    pub fn get(&self, name: &str) -> Result<&S> {
        self.feeds
            .iter()
            .find(|feed| feed.name() == name)
            .ok_or_else(|| Error::config(format!("unknown feed: {name}")))
    }

    pub async fn run<N, B, C>(
        &self,
        coordinator: &RunCoordinator<N, B, C>,
        name: &str,
        scope: ScopeOverride,
    ) -> Result<RunOutcome>
    where
        N: Notifier,
        B: Backup,
        C: Clock,
    {
        let feed = self.get(name)?;
        coordinator.run(feed, scope).await
    }

    /// Runs every feed accepted by `filter` one after another. A failing
    /// feed does not stop the rest.
    pub async fn run_matching<N, B, C, F>(
        &self,
        coordinator: &RunCoordinator<N, B, C>,
        scope: ScopeOverride,
        filter: F,
    ) -> RunSummary
    where
        N: Notifier,
        B: Backup,
        C: Clock,
        F: Fn(&S) -> bool,
    {
        let mut summary = RunSummary::default();
        for feed in self.feeds.iter().filter(|feed| filter(feed)) {
            let result = coordinator.run(feed, scope).await;
            if let Err(err) = &result {
                error!("{}: run failed: {err}", feed.name());
            }
            summary.results.push((feed.name().to_string(), result));
        }
        info!(
            "ran {} feeds, {} failed",
            summary.results.len(),
            summary.failures().len()
        );
        summary
    }
}

impl FeedRegistry<Source> {
    /// Builds one source per configured feed.
    pub fn from_config(config: &RailcronConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let storage = Storage {
            archiver: match &config.settings.scratch_dir {
                Some(dir) => Archiver::new().with_scratch_root(dir),
                None => Archiver::new(),
            },
            codec: config.settings.codec()?,
        };
        let http = HttpClient::new()?;
        let hashes = MarkerStore::new(config.settings.state_dir());

        let feeds = config
            .feeds
            .iter()
            .map(|feed| build_source(feed, &storage, &http, &hashes, &clock))
            .collect::<Result<Vec<_>>>()?;
        Self::new(feeds)
    }

    pub async fn run_all<N, B, C>(
        &self,
        coordinator: &RunCoordinator<N, B, C>,
        family: Option<Family>,
        scope: ScopeOverride,
    ) -> RunSummary
    where
        N: Notifier,
        B: Backup,
        C: Clock,
    {
        self.run_matching(coordinator, scope, |feed| {
            family.map_or(true, |family| feed.family() == family)
        })
        .await
    }
}

/// Results of a multi-feed run, in run order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<(String, Result<RunOutcome>)>,
}

impl RunSummary {
    /// Feeds that returned an error or a swallowed failure.
    pub fn failures(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, result)| match result {
                Ok(outcome) => outcome.is_failed(),
                Err(_) => true,
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }
}

/// The production coordinator: markers under the state dir, mail from the
/// `MAIL_*` settings and rsync backups.
pub fn coordinator_from_settings<C: Clock>(
    settings: &Settings,
    clock: C,
) -> Result<RunCoordinator<Mailer, RsyncBackup, C>> {
    let markers = MarkerStore::new(settings.state_dir());
    let mailer = Mailer::from_settings(settings.mail()?)?;
    let backup = RsyncBackup::new(settings.backup_host.clone(), settings.backup_root.clone());
    Ok(RunCoordinator::new(markers, mailer, backup, clock))
}

fn build_source(
    feed: &FeedConfig,
    storage: &Storage,
    http: &HttpClient,
    hashes: &MarkerStore,
    clock: &Arc<dyn Clock>,
) -> Result<Source> {
    let name = feed.name.as_str();
    let policy = feed.policy();
    let source = match &feed.spec {
        FeedSpec::A51(config) => Source::A51(A51Source::new(
            name,
            policy,
            A51Settings {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
                key: config.key.clone(),
                filetype: config.filetype.clone(),
            },
            storage.clone(),
            http.clone(),
        )),
        FeedSpec::Nrdp(config) => Source::Nrdp(NrdpSource::new(
            name,
            policy,
            NrdpSettings {
                s3: S3Settings::anonymous(&config.bucket, &config.region_name).with_credentials(
                    &config.aws_access_key_id,
                    &config.aws_secret_access_key,
                ),
                key: config.key.clone(),
                date_in_key: config.date_in_key,
                filetype: config.filetype.clone(),
                filter: config.filter.as_deref().map(str::parse).transpose()?,
            },
            storage.clone(),
        )),
        FeedSpec::Hda(config) => Source::Hda(HdaSource::new(
            name,
            policy,
            &config.url,
            storage.clone(),
            http.clone(),
        )),
        FeedSpec::Opendata(config) => Source::Opendata(OpendataSource::new(
            name,
            policy,
            OpendataSettings {
                username: config.username.clone(),
                password: config.password.clone(),
                auth_url: config.auth_url.clone(),
                data_url: config.data_url.clone(),
                filetype: config.filetype.clone(),
            },
            storage.clone(),
            http.clone(),
            Arc::clone(clock),
        )?),
        FeedSpec::Datafeeds(config) => Source::Datafeeds(DatafeedsSource::new(
            name,
            policy,
            DatafeedsSettings {
                username: config.username.clone(),
                password: config.password.clone(),
                data_url: config.data_url.clone(),
                params: config
                    .params
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
                filetype: config.filetype.clone(),
                detect_unchanged: config
                    .detect_unchanged
                    .unwrap_or_else(|| name.starts_with("data_")),
                recompress_in_place: config.recompress_in_place,
            },
            storage.clone(),
            http.clone(),
            hashes.clone(),
            Arc::clone(clock),
        )),
    };
    Ok(source)
}

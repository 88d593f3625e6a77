use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use railcron::config;
use railcron::core::clock::{Clock, SystemClock};
use railcron::feeds::{FeedSource, Family};
use railcron::reconcile::RunOutcome;
use railcron::storage::MarkerStore;
use railcron::{coordinator_from_settings, FeedRegistry, ScopeOverride};

#[derive(Parser)]
#[command(name = "railcron")]
#[command(about = "Fetch new railway data files into the local archive")]
struct Cli {
    /// Config file (default: $RAILCRON_CFG/railcron.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one feed, or `all`
    Run {
        feed: String,

        /// With `all`, only feeds of this family (a51, nrdp, hda, opendata, datafeeds)
        #[arg(long)]
        family: Option<String>,

        #[arg(long, requires = "month")]
        year: Option<i32>,

        #[arg(long, requires = "year")]
        month: Option<u8>,

        #[arg(long)]
        day: Option<u8>,
    },
    /// List configured feeds
    Feeds,
    /// Print the marker's new file if it changed since the last ack
    Marker { name: String },
    /// Mark the current file as consumed
    Ack { name: String },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let path = config::config_path(cli.config.as_deref());
    let config = config::load(&path).with_context(|| format!("loading {}", path.display()))?;

    match cli.command {
        Commands::Run {
            feed,
            family,
            year,
            month,
            day,
        } => {
            // Reads the local offset, so it has to happen before the runtime
            // starts any threads.
            let clock = SystemClock::new();
            let scope = ScopeOverride { year, month, day };
            let family = family
                .as_deref()
                .map(str::parse::<Family>)
                .transpose()
                .context("parsing --family")?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting tokio runtime")?;
            runtime.block_on(run(&config, clock, &feed, family, scope))
        }
        Commands::Feeds => {
            for feed in &config.feeds {
                println!(
                    "{}\t{}\t{}",
                    feed.name,
                    feed.family(),
                    feed.spec.common().archive_path.display()
                );
            }
            Ok(())
        }
        Commands::Marker { name } => {
            let markers = MarkerStore::new(config.settings.state_dir());
            let key = marker_key(&config, &name);
            if let Some(fresh) = markers
                .query(&key)
                .with_context(|| format!("reading marker {key}"))?
            {
                println!("{fresh}");
            }
            Ok(())
        }
        Commands::Ack { name } => {
            let markers = MarkerStore::new(config.settings.state_dir());
            let key = marker_key(&config, &name);
            let changed = markers
                .acknowledge(&key)
                .with_context(|| format!("acknowledging marker {key}"))?;
            if !changed {
                log::info!("marker {key}: nothing to acknowledge");
            }
            Ok(())
        }
    }
}

async fn run(
    config: &config::RailcronConfig,
    clock: SystemClock,
    feed: &str,
    family: Option<Family>,
    scope: ScopeOverride,
) -> Result<()> {
    let shared: Arc<dyn Clock> = Arc::new(clock);
    let registry = FeedRegistry::from_config(config, shared).context("building feeds")?;
    let coordinator =
        coordinator_from_settings(&config.settings, clock).context("building coordinator")?;

    if feed == "all" {
        let summary = registry.run_all(&coordinator, family, scope).await;
        for (name, result) in &summary.results {
            match result {
                Ok(outcome) => println!("{name}: {}", describe(outcome)),
                Err(err) => println!("{name}: error: {err}"),
            }
        }
        let failures = summary.failures();
        if !failures.is_empty() {
            bail!("{} feed(s) failed: {}", failures.len(), failures.join(", "));
        }
        return Ok(());
    }

    if family.is_some() {
        bail!("--family only applies to `run all`");
    }
    let source = registry.get(feed)?;
    let outcome = registry
        .run(&coordinator, source.name(), scope)
        .await
        .with_context(|| format!("running {feed}"))?;
    println!("{feed}: {}", describe(&outcome));
    if outcome.is_failed() {
        bail!("{feed} failed");
    }
    Ok(())
}

fn marker_key(config: &config::RailcronConfig, name: &str) -> String {
    config
        .feed(name)
        .map(|feed| feed.policy().marker)
        .unwrap_or_else(|| name.to_string())
}

fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Archived { files, marker } => {
            format!("archived {} file(s), newest {}", files.len(), marker.display())
        }
        RunOutcome::NoOp => "nothing new".to_string(),
        RunOutcome::Failed { phase, message } => format!("failed during {phase}: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_day_is_accepted() {
        let cli = Cli::try_parse_from(["railcron", "run", "sched_full", "--day", "15"])
            .expect("parse");
        match cli.command {
            Commands::Run {
                year, month, day, ..
            } => assert_eq!((year, month, day), (None, None, Some(15))),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn year_still_needs_month() {
        assert!(Cli::try_parse_from(["railcron", "run", "a51_trust", "--year", "2023"]).is_err());
    }
}

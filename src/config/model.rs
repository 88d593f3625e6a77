//! Shape of `railcron.yml`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::error::{Error, Result};
use crate::feeds::a51::{DEFAULT_BUCKET, DEFAULT_REGION};
use crate::feeds::hda::DEFAULT_CONTAINER_URL;
use crate::feeds::opendata::DEFAULT_AUTH_URL;
use crate::feeds::{FailurePolicy, Family, FeedPolicy};
use crate::notify::{MailSecurity, MailSettings};
use crate::storage::Codec;

pub const STATE_ENV: &str = "RAILCRON_STATE";
const DEFAULT_STATE_DIR: &str = "./state";

/// The `settings` section shared by every feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default, alias = "RECOMPRESS")]
    pub recompress: Option<String>,
    #[serde(default, rename = "BACKUP_HOST", alias = "backup_host")]
    pub backup_host: Option<String>,
    #[serde(default, rename = "BACKUP_ROOT", alias = "backup_root")]
    pub backup_root: Option<String>,
    #[serde(default, rename = "MAIL_FROM", alias = "mail_from")]
    pub mail_from: Option<String>,
    #[serde(default, rename = "MAIL_TO", alias = "mail_to")]
    pub mail_to: Option<String>,
    #[serde(default, rename = "MAIL_CC", alias = "mail_cc")]
    pub mail_cc: Option<String>,
    #[serde(default, rename = "MAIL_BCC", alias = "mail_bcc")]
    pub mail_bcc: Option<String>,
    #[serde(default, rename = "MAIL_LOGIN", alias = "mail_login")]
    pub mail_login: Option<String>,
    #[serde(default, rename = "MAIL_PWD", alias = "mail_pwd")]
    pub mail_pwd: Option<String>,
    #[serde(default, rename = "MAIL_SRV", alias = "mail_srv")]
    pub mail_srv: Option<String>,
    #[serde(default, rename = "MAIL_TYPE", alias = "mail_type")]
    pub mail_type: Option<String>,
    #[serde(default, rename = "MAIL_PORT", alias = "mail_port")]
    pub mail_port: Option<u16>,
    #[serde(default, alias = "STATE_DIR")]
    pub state_dir: Option<PathBuf>,
    /// Parent of repack scratch directories; the system temp dir if unset.
    #[serde(default, alias = "SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,
}

impl Settings {
    pub fn codec(&self) -> Result<Codec> {
        self.recompress.as_deref().unwrap_or("").parse()
    }

    /// Marker store root: `state_dir`, then `$RAILCRON_STATE`, then `./state`.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .or_else(|| std::env::var_os(STATE_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }

    pub fn mail(&self) -> Result<MailSettings> {
        Ok(MailSettings {
            from: self.mail_from.clone().unwrap_or_default(),
            to: self.mail_to.clone().unwrap_or_default(),
            cc: self.mail_cc.clone(),
            bcc: self.mail_bcc.clone(),
            login: self.mail_login.clone(),
            password: self.mail_pwd.clone(),
            server: self.mail_srv.clone(),
            security: self.mail_type.as_deref().unwrap_or("").parse()?,
            port: self.mail_port,
        })
    }
}

/// `nrdatafeeds` and `opendata` account sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Keys every feed section accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedCommon {
    pub archive_path: PathBuf,
    #[serde(default)]
    pub rsync: Option<String>,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub swallow_errors: bool,
}

impl FeedCommon {
    pub fn policy(&self, name: &str) -> FeedPolicy {
        let mut policy = FeedPolicy::new(name, self.archive_path.clone());
        if let Some(marker) = self.marker.as_deref().filter(|m| !m.trim().is_empty()) {
            policy.marker = marker.trim().to_string();
        }
        policy.rsync = self.rsync.clone().filter(|rsync| !rsync.trim().is_empty());
        if self.swallow_errors {
            policy.on_failure = FailurePolicy::Swallow;
        }
        policy
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct A51Config {
    #[serde(flatten)]
    pub common: FeedCommon,
    #[serde(default = "default_a51_bucket")]
    pub bucket: String,
    #[serde(default = "default_a51_region")]
    pub region: String,
    pub key: String,
    #[serde(default)]
    pub filetype: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NrdpConfig {
    #[serde(flatten)]
    pub common: FeedCommon,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub region_name: String,
    pub bucket: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub date_in_key: bool,
    #[serde(default)]
    pub filetype: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HdaConfig {
    #[serde(flatten)]
    pub common: FeedCommon,
    #[serde(default = "default_hda_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpendataConfig {
    #[serde(flatten)]
    pub common: FeedCommon,
    pub username: String,
    pub password: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    pub data_url: String,
    #[serde(default = "default_incidents_filetype")]
    pub filetype: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatafeedsConfig {
    #[serde(flatten)]
    pub common: FeedCommon,
    pub username: String,
    pub password: String,
    pub data_url: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub filetype: String,
    /// Defaults to on for `data_*` feeds.
    #[serde(default)]
    pub detect_unchanged: Option<bool>,
    #[serde(default)]
    pub recompress_in_place: bool,
}

/// One feed section, typed by family.
#[derive(Debug, Clone)]
pub enum FeedSpec {
    A51(A51Config),
    Nrdp(NrdpConfig),
    Hda(HdaConfig),
    Opendata(OpendataConfig),
    Datafeeds(DatafeedsConfig),
}

impl FeedSpec {
    pub fn family(&self) -> Family {
        match self {
            FeedSpec::A51(_) => Family::A51,
            FeedSpec::Nrdp(_) => Family::Nrdp,
            FeedSpec::Hda(_) => Family::Hda,
            FeedSpec::Opendata(_) => Family::Opendata,
            FeedSpec::Datafeeds(_) => Family::Datafeeds,
        }
    }

    pub fn common(&self) -> &FeedCommon {
        match self {
            FeedSpec::A51(config) => &config.common,
            FeedSpec::Nrdp(config) => &config.common,
            FeedSpec::Hda(config) => &config.common,
            FeedSpec::Opendata(config) => &config.common,
            FeedSpec::Datafeeds(config) => &config.common,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub spec: FeedSpec,
}

impl FeedConfig {
    pub fn family(&self) -> Family {
        self.spec.family()
    }

    pub fn policy(&self) -> FeedPolicy {
        self.spec.common().policy(&self.name)
    }
}

/// A loaded and validated configuration file.
#[derive(Debug, Clone)]
pub struct RailcronConfig {
    pub settings: Settings,
    /// Feeds in file order.
    pub feeds: Vec<FeedConfig>,
}

impl RailcronConfig {
    pub fn feed(&self, name: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|feed| feed.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.codec()?;
        let mail = self.settings.mail()?;
        if !mail.uses_local_relay() {
            if mail.from.trim().is_empty() || mail.to.trim().is_empty() {
                return Err(Error::config("MAIL_SRV is set but MAIL_FROM or MAIL_TO is empty"));
            }
            if mail.security != MailSecurity::Insecure
                && (mail.login.is_none() || mail.password.is_none())
            {
                return Err(Error::config("MAIL_SRV needs MAIL_LOGIN and MAIL_PWD"));
            }
        }
        for feed in &self.feeds {
            validate_feed(feed)?;
        }
        Ok(())
    }
}

fn validate_feed(feed: &FeedConfig) -> Result<()> {
    let name = &feed.name;
    if feed.spec.common().archive_path.as_os_str().is_empty() {
        return Err(Error::config(format!("feed {name}: archive_path is empty")));
    }
    match &feed.spec {
        FeedSpec::A51(config) => {
            if !config.key.starts_with("archive/rail/") || !config.key.ends_with('/') {
                return Err(Error::config(format!(
                    "feed {name}: key must look like archive/rail/<feed>/"
                )));
            }
        }
        FeedSpec::Nrdp(config) => {
            if config.date_in_key && !config.key.is_empty() && !config.key.ends_with('/') {
                return Err(Error::config(format!(
                    "feed {name}: key must end with / when date_in_key is set"
                )));
            }
            if let Some(filter) = config.filter.as_deref() {
                filter.parse::<crate::feeds::DayFilter>()?;
            }
        }
        FeedSpec::Hda(config) => {
            url::Url::parse(&config.url)
                .map_err(|err| Error::config(format!("feed {name}: bad url: {err}")))?;
        }
        FeedSpec::Opendata(config) => {
            crate::feeds::OpendataKind::from_feed_name(name)?;
            url::Url::parse(&config.data_url)
                .map_err(|err| Error::config(format!("feed {name}: bad data_url: {err}")))?;
        }
        FeedSpec::Datafeeds(config) => {
            url::Url::parse(&config.data_url)
                .map_err(|err| Error::config(format!("feed {name}: bad data_url: {err}")))?;
            if config.filetype.trim().is_empty() {
                return Err(Error::config(format!("feed {name}: filetype is empty")));
            }
        }
    }
    Ok(())
}

fn default_a51_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_a51_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_hda_url() -> String {
    DEFAULT_CONTAINER_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_incidents_filetype() -> String {
    "gz".to_string()
}

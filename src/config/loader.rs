use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::config::model::{
    Credentials, FeedConfig, FeedSpec, RailcronConfig, Settings,
};
use crate::core::error::{Error, Result};
use crate::feeds::Family;

pub const CONFIG_ENV: &str = "RAILCRON_CFG";
pub const CONFIG_FILE: &str = "railcron.yml";

const SETTINGS_KEY: &str = "settings";
const CREDENTIAL_SECTIONS: [&str; 2] = ["nrdatafeeds", "opendata"];
const CREDENTIAL_FIELDS: [&str; 2] = ["username", "password"];

/// `explicit`, or `railcron.yml` in `$RAILCRON_CFG` (default `.`).
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let dir = std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            dir.join(CONFIG_FILE)
        }
    }
}

pub fn load(path: &Path) -> Result<RailcronConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| Error::config(format!("cannot read {}: {err}", path.display())))?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<RailcronConfig> {
    let root: Value = serde_yaml::from_str(text)?;
    let Value::Mapping(root) = root else {
        return Err(Error::config("top level of the config must be a mapping"));
    };

    let settings: Settings = section(&root, SETTINGS_KEY)?.unwrap_or_default();
    let mut credentials = Vec::new();
    for name in CREDENTIAL_SECTIONS {
        let creds: Credentials = section(&root, name)?.unwrap_or_default();
        credentials.push((name, creds));
    }

    let mut feeds = Vec::new();
    for (key, value) in &root {
        let Some(name) = key.as_str() else {
            return Err(Error::config(format!("non-string top-level key: {key:?}")));
        };
        if name == SETTINGS_KEY || CREDENTIAL_SECTIONS.contains(&name) {
            continue;
        }
        let mut value = value.clone();
        substitute_credentials(&mut value, &credentials);
        let spec = match Family::from_feed_name(name)? {
            Family::A51 => FeedSpec::A51(feed_section(name, value)?),
            Family::Nrdp => FeedSpec::Nrdp(feed_section(name, value)?),
            Family::Hda => FeedSpec::Hda(feed_section(name, value)?),
            Family::Opendata => FeedSpec::Opendata(feed_section(name, value)?),
            Family::Datafeeds => FeedSpec::Datafeeds(feed_section(name, value)?),
        };
        debug!("config: feed {name} ({})", spec.family());
        feeds.push(FeedConfig {
            name: name.to_string(),
            spec,
        });
    }

    let config = RailcronConfig { settings, feeds };
    config.validate()?;
    Ok(config)
}

fn section<T: DeserializeOwned>(root: &Mapping, key: &str) -> Result<Option<T>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|err| Error::config(format!("section {key}: {err}"))),
    }
}

fn feed_section<T: DeserializeOwned>(name: &str, value: Value) -> Result<T> {
    serde_yaml::from_value(value).map_err(|err| Error::config(format!("feed {name}: {err}")))
}

/// Replaces `{section}__{field}` tokens in a feed's `username` and
/// `password` with the account values.
fn substitute_credentials(feed: &mut Value, credentials: &[(&str, Credentials)]) {
    let Value::Mapping(feed) = feed else {
        return;
    };
    for field in CREDENTIAL_FIELDS {
        let Some(Value::String(current)) = feed.get_mut(field) else {
            continue;
        };
        for (section, creds) in credentials {
            let token = format!("{section}__{field}");
            let replacement = match field {
                "username" => &creds.username,
                _ => &creds.password,
            };
            if current.contains(&token) {
                *current = current.replace(&token, replacement);
            }
        }
    }
}

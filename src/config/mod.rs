//! `railcron.yml`: global settings, account sections and one section per
//! feed, typed by the family its name selects.

mod loader;
mod model;

pub use loader::{config_path, load, parse, CONFIG_ENV, CONFIG_FILE};
pub use model::{
    A51Config, Credentials, DatafeedsConfig, FeedCommon, FeedConfig, FeedSpec, HdaConfig,
    NrdpConfig, OpendataConfig, RailcronConfig, Settings, STATE_ENV,
};

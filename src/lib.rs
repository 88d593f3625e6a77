//! Scheduled fetch-and-archive jobs for published railway data feeds.
//!
//! Each configured feed lists what its provider publishes, works out which
//! objects are not yet in the date-partitioned archive, fetches and stores
//! them, and records the newest file in a per-feed change marker that
//! downstream consumers poll.

pub mod backup;
pub mod config;
pub mod core;
pub mod feeds;
pub mod layout;
pub mod notify;
pub mod reconcile;
pub mod registry;
pub mod storage;
pub mod transport;

pub use crate::core::error::{Error, Result};
pub use crate::core::scope::{Scope, ScopeOverride};
pub use registry::{coordinator_from_settings, FeedRegistry, RunSummary};

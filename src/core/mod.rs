//! Shared building blocks: errors, clocks, scopes and the remote object model.

pub mod clock;
pub mod error;
pub mod object;
pub mod scope;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use object::{FeedIdentity, ProviderKind, RemoteObject};
pub use scope::{PathStyle, Scope, ScopeOverride};

use std::fmt;

use time::OffsetDateTime;

use crate::core::scope::Scope;

/// One entry of a provider listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full remote key, listing name, or endpoint URL.
    pub key: String,
    /// `UNIX_EPOCH` when the provider does not report a usable time.
    pub last_modified: OffsetDateTime,
    pub size: u64,
    /// Download location when it differs from the key (HTTP listings).
    pub url: Option<String>,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, last_modified: OffsetDateTime, size: u64) -> Self {
        Self {
            key: key.into(),
            last_modified,
            size,
            url: None,
        }
    }

    /// An entry from a listing that only carries names.
    pub fn named(key: impl Into<String>, url: Option<String>) -> Self {
        Self {
            key: key.into(),
            last_modified: OffsetDateTime::UNIX_EPOCH,
            size: 0,
            url,
        }
    }

    /// The virtual object standing in for a single-endpoint feed.
    pub fn endpoint(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::named(url.clone(), Some(url))
    }

    /// Last path segment of the key.
    pub fn basename(&self) -> &str {
        basename(&self.key)
    }
}

pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    HttpListing,
    S3,
    SingleUrl,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderKind::HttpListing => "http-listing",
            ProviderKind::S3 => "s3",
            ProviderKind::SingleUrl => "single-url",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedIdentity {
    pub name: String,
    pub provider_kind: ProviderKind,
    pub scope: Scope,
}

impl fmt::Display for FeedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.name, self.provider_kind, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_key_prefix() {
        let object = RemoteObject::named("archive/rail/trust/2023/8/3.tbz2", None);
        assert_eq!(object.basename(), "3.tbz2");
        assert_eq!(basename("plain.xml.gz"), "plain.xml.gz");
    }

    #[test]
    fn named_objects_use_epoch_sentinel() {
        let object = RemoteObject::named("2023/file.zip", Some("https://x/2023/file.zip".into()));
        assert_eq!(object.last_modified, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(object.size, 0);
    }
}

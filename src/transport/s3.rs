use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use log::debug;
use time::OffsetDateTime;

use crate::core::error::{Error, Result};
use crate::core::object::RemoteObject;
use crate::transport::Download;

/// Where and how to reach one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// `(access key id, secret access key)`; `None` for public buckets.
    pub credentials: Option<(String, String)>,
}

impl S3Settings {
    /// Settings for a public bucket read without signing requests.
    pub fn anonymous(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.credentials = Some((access_key_id.into(), secret_access_key.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));
        loader = match &settings.credentials {
            Some((access_key_id, secret_access_key)) => loader.credentials_provider(
                Credentials::new(access_key_id, secret_access_key, None, None, "railcron"),
            ),
            None => loader.no_credentials(),
        };
        let config = loader.load().await;
        Self {
            client: Client::new(&config),
            bucket: settings.bucket.clone(),
        }
    }

    /// Every object below `prefix`, following continuation tokens.
    pub async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|err| self.error(prefix, DisplayErrorContext(err)))?;

            for object in response.contents.unwrap_or_default() {
                let key = object.key.unwrap_or_default();
                if key.is_empty() || key.ends_with('/') {
                    continue;
                }
                let last_modified = object
                    .last_modified
                    .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts.secs()).ok())
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH);
                let size = object.size.unwrap_or(0).max(0) as u64;
                objects.push(RemoteObject::new(key, last_modified, size));
            }

            if response.is_truncated == Some(true) {
                continuation_token = response.next_continuation_token;
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        debug!("s3://{}/{prefix}: {} objects", self.bucket, objects.len());
        Ok(objects)
    }

    pub async fn get(&self, key: &str) -> Result<Download> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.error(key, DisplayErrorContext(err)))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|err| self.error(key, err))?;
        Ok(Download::bytes(data.into_bytes().to_vec()))
    }

    fn error(&self, key: &str, err: impl std::fmt::Display) -> Error {
        Error::transport(format!("s3://{}/{key}", self.bucket), err.to_string())
    }
}

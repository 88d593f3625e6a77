//! Provider-facing collaborators: HTTP, S3 and the blob listing format.

pub mod http;
pub mod listing;
pub mod s3;

pub use http::{Auth, HttpClient};
pub use listing::{parse_blob_listing, BlobEntry};
pub use s3::{S3Settings, S3Store};

use crate::core::error::Result;

/// Content of one fetched object.
pub enum Body {
    Bytes(Vec<u8>),
    /// A response whose body has not been read yet.
    Stream(reqwest::Response),
}

pub struct Download {
    pub body: Body,
    /// Filename offered by the provider (`Content-Disposition`).
    pub filename_hint: Option<String>,
}

impl Download {
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self {
            body: Body::Bytes(bytes),
            filename_hint: None,
        }
    }

    pub fn stream(response: reqwest::Response) -> Self {
        let filename_hint = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(content_disposition_filename);
        Self {
            body: Body::Stream(response),
            filename_hint,
        }
    }

    pub fn with_filename_hint(mut self, filename: impl Into<String>) -> Self {
        self.filename_hint = Some(filename.into());
        self
    }

    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        match self.body {
            Body::Bytes(bytes) => Ok(bytes),
            Body::Stream(response) => Ok(response.bytes().await?.to_vec()),
        }
    }

    pub async fn into_text(self) -> Result<String> {
        match self.body {
            Body::Bytes(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Body::Stream(response) => Ok(response.text().await?),
        }
    }
}

/// Extracts the filename from a `Content-Disposition` value such as
/// `attachment; filename="RJTTF123.ZIP"`.
pub fn content_disposition_filename(value: &str) -> Option<String> {
    if let Some(quoted) = value.split('"').nth(1) {
        let quoted = quoted.trim();
        return (!quoted.is_empty()).then(|| quoted.to_string());
    }
    value
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("filename="))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_quoted_disposition() {
        assert_eq!(
            content_disposition_filename("attachment; filename=\"RJTTF123.ZIP\""),
            Some("RJTTF123.ZIP".to_string())
        );
    }

    #[test]
    fn filename_from_bare_disposition() {
        assert_eq!(
            content_disposition_filename("attachment; filename=RJTTF456.ZIP"),
            Some("RJTTF456.ZIP".to_string())
        );
        assert_eq!(content_disposition_filename("inline"), None);
    }

    #[tokio::test]
    async fn bytes_download_reads_back() {
        let download = Download::bytes(b"<xml/>".to_vec()).with_filename_hint("x.xml");
        assert_eq!(download.filename_hint.as_deref(), Some("x.xml"));
        assert_eq!(download.into_text().await.expect("text"), "<xml/>");
    }
}

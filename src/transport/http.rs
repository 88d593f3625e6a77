use std::time::Duration;

use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::transport::Download;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials attached to a request.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    /// `X-Auth-Token` header.
    Token(String),
}

/// Thin wrapper over `reqwest` that turns non-2xx responses into
/// `Error::Transport` after logging the full response.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let inner = Client::builder()
            .user_agent(concat!("railcron/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { inner })
    }

    /// GETs `url`, returning the unread response body.
    pub async fn get(&self, url: &str, query: &[(String, String)], auth: &Auth) -> Result<Download> {
        let mut request = self.inner.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = send(with_auth(request, auth), url).await?;
        Ok(Download::stream(response))
    }

    pub async fn get_text(&self, url: &str, query: &[(String, String)]) -> Result<String> {
        self.get(url, query, &Auth::None).await?.into_text().await
    }

    /// POSTs a url-encoded form and decodes the JSON reply.
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value> {
        let response = send(self.inner.post(url).form(form), url).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|err| Error::Transport {
            target: url.to_string(),
            status: None,
            message: format!("invalid JSON reply: {err}"),
        })
    }
}

fn with_auth(request: RequestBuilder, auth: &Auth) -> RequestBuilder {
    match auth {
        Auth::None => request,
        Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        Auth::Token(token) => request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-Auth-Token", token),
    }
}

async fn send(request: RequestBuilder, target: &str) -> Result<Response> {
    let response = request.send().await?;
    check_status(response, target).await
}

async fn check_status(response: Response, target: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        debug!("{target}: {status}");
        return Ok(response);
    }
    error!("request to {target} failed: {status}");
    error!("{:?}", response.headers());
    let body = response.text().await.unwrap_or_default();
    error!("{body}");
    Err(Error::Transport {
        target: target.to_string(),
        status: Some(status.as_u16()),
        message: format!("unexpected status {status}"),
    })
}

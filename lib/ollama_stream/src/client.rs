use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client as ReqwestClient, Response as ReqwestResponse};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Json;

/// Default Ollama server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Default connect/read timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Connection settings for an Ollama server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Default config with the base url taken from `OLLAMA_BASE_URL` when set.
    pub fn from_env() -> Self {
        match std::env::var("OLLAMA_BASE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => Self {
                base_url,
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// HTTP client bound to a single Ollama server.
#[derive(Debug, Clone)]
pub struct Client {
    reqwest: ReqwestClient,
    config: ClientConfig,
    headers: HeaderMap,
}

impl Client {
    /// Creates a new client from the given config.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidBaseUrl(config.base_url));
        }

        let reqwest = ReqwestClient::builder()
            .connect_timeout(config.timeout())
            .build()?;

        log::debug!("Created reqwest client for {base_url}");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            reqwest,
            config: ClientConfig { base_url, ..config },
            headers,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.base_url)
    }

    /// Makes a GET request to the Ollama API.
    ///
    /// The whole request, body included, must finish within the configured
    /// timeout.
    pub async fn get(&self, endpoint: &str) -> Result<ReqwestResponse, Error> {
        let url = self.url(endpoint);
        log::debug!("GET {url}");

        let response = self
            .reqwest
            .get(url)
            .headers(self.headers.clone())
            .timeout(self.config.timeout())
            .send()
            .await?;

        check_status(response).await
    }

    /// Makes a POST request to the Ollama API whose body is read incrementally.
    ///
    /// The timeout bounds the wait for the response headers; reads of the body
    /// are bounded per chunk by the caller.
    pub async fn post_stream(&self, endpoint: &str, body: &Json) -> Result<ReqwestResponse, Error> {
        let url = self.url(endpoint);
        log::debug!("POST {url}");

        let timeout = self.config.timeout();
        let request = self
            .reqwest
            .post(url)
            .headers(self.headers.clone())
            .body(body.to_string())
            .send();

        let response = match tokio::time::timeout(timeout, request).await {
            Ok(response) => response?,
            Err(_) => {
                log::debug!("no response headers received for {timeout:?}");
                return Err(Error::Timeout(timeout));
            }
        };

        check_status(response).await
    }
}

/// Turns non-success responses into `Error::Status`, keeping the body for context.
async fn check_status(response: ReqwestResponse) -> Result<ReqwestResponse, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    log::debug!("{status}: {body}");

    Err(Error::Status { status, body })
}

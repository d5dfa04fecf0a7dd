use crate::error::FetchError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/65.0.3325.181 Safari/537.36";

/// Page text, or why it could not be fetched
pub type FetchResult = std::result::Result<String, FetchError>;

/// Anything that can turn a URL into page text
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// Creates an HTTP client that presents itself as a desktop browser
pub fn create_http_client(user_agent: &str) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-US,en;q=0.9")
    );
    headers.insert(
        header::ACCEPT_ENCODING,
        header::HeaderValue::from_static("gzip, deflate, br")
    );
    headers.insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive")
    );
    headers.insert(
        "Upgrade-Insecure-Requests",
        header::HeaderValue::from_static("1")
    );

    let client = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()?;

    Ok(client)
}

/// Fetches pages over HTTP, sleeping a fixed delay before every request
pub struct HttpFetcher {
    client: Client,
    delay: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, request_delay_ms: u64) -> Result<Self> {
        Ok(Self {
            client: create_http_client(user_agent)?,
            delay: Duration::from_millis(request_delay_ms),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        // Be nice to the server
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        // Sites declare charsets inconsistently; always decode as UTF-8
        let bytes = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        tracing::trace!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

//! HTTP client wrapper for fetching page images.
//!
//! This module provides the `HttpClient` struct which streams a page body into
//! memory with timeout configuration, an optional size cap and structured errors.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::FetchError;
use super::fetcher::PageFetcher;
use crate::user_agent;

/// HTTP client for fetching page images.
///
/// This client is designed to be created once and shared by every fetch task
/// of a job, taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use page_downloader::download::{HttpClient, PageFetcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let bytes = client.fetch("https://archive.example/book/00000001.tif").await?;
/// println!("Fetched {} bytes", bytes.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_page_bytes: Option<u64>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - Gzip decompression: enabled
    /// - No page size cap
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::try_new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the underlying `reqwest::Error` if the client cannot be built
    /// (for example when the TLS backend fails to initialize).
    #[instrument(level = "debug")]
    pub fn try_new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_page_user_agent())
            .build()?;
        Ok(Self {
            client,
            max_page_bytes: None,
        })
    }

    /// Rejects page bodies larger than `limit` bytes.
    #[must_use]
    pub fn with_max_page_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_page_bytes = limit;
        self
    }

    /// Returns the configured page size cap, if any.
    #[must_use]
    pub fn max_page_bytes(&self) -> Option<u64> {
        self.max_page_bytes
    }

    /// Fetches a URL into memory.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - The body exceeds the configured page size cap
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("starting fetch");

        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let declared_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let (Some(limit), Some(declared)) = (self.max_page_bytes, declared_length)
            && declared > limit
        {
            return Err(FetchError::too_large(url, limit));
        }

        let bytes = self.collect_body(response, url).await?;
        debug!(bytes = bytes.len(), "fetch complete");
        Ok(bytes)
    }

    /// Streams the response body, enforcing the size cap as chunks arrive.
    async fn collect_body(
        &self,
        response: reqwest::Response,
        url: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let capacity = response
            .content_length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url)
                } else {
                    FetchError::network(url, e)
                }
            })?;
            body.extend_from_slice(&chunk);

            if let Some(limit) = self.max_page_bytes
                && body.len() as u64 > limit
            {
                return Err(FetchError::too_large(url, limit));
            }
        }

        Ok(body)
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_bytes(url).await
    }
}

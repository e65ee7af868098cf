//! The page fetching seam used by the batch scheduler.

use async_trait::async_trait;

use super::FetchError;

/// Fetches the raw bytes behind a fully-formed page URL.
///
/// Implementations perform a single attempt: no retry, no persistence. The
/// scheduler layers timeouts, retries and cancellation on top.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure, timeout or a non-2xx response.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Outcome of fetching one page.
#[derive(Debug)]
pub struct FetchResult {
    /// Page number the fetch was for.
    pub page: u32,
    /// The page bytes, or the error of the last attempt.
    pub outcome: Result<Vec<u8>, FetchError>,
}

//! Error types for the download module.
//!
//! This module defines structured errors for page fetches, providing
//! context-rich error messages for logs and progress reports.

use thiserror::Error;

/// Errors that can occur while fetching a single page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Response body exceeded the configured page size cap.
    #[error("page at {url} exceeds {limit} bytes")]
    TooLarge {
        /// The URL whose body was too large.
        url: String,
        /// The configured cap in bytes.
        limit: u64,
    },

    /// The owning job was cancelled before the fetch finished.
    #[error("fetch of {url} cancelled")]
    Cancelled {
        /// The URL whose fetch was abandoned.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an oversized-body error.
    pub fn too_large(url: impl Into<String>, limit: u64) -> Self {
        Self::TooLarge {
            url: url.into(),
            limit,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns true when the fetch was abandoned because its job was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// No `From<reqwest::Error>`: every variant needs the URL, which the source
// error does not reliably carry. Use the constructors above.

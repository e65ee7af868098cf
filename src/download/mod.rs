//! HTTP page fetching.
//!
//! This module provides everything needed to turn a page number into page
//! bytes: the URL convention, the [`PageFetcher`] seam, the reqwest-backed
//! [`HttpClient`], and the opt-in [`RetryPolicy`].
//!
//! # Features
//!
//! - Streaming body collection with an optional per-page size cap
//! - Configurable timeouts (30s connect, 5min read by default)
//! - Structured error types with full context
//! - Zero retries by default, exponential backoff when enabled
//!
//! # Example
//!
//! ```no_run
//! use page_downloader::download::{HttpClient, PageFetcher, page_url};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let url = page_url("https://archive.example/data/book/PTIFF/", 1);
//! let bytes = client.fetch(&url).await?;
//! println!("Fetched {} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod fetcher;
mod page_url;
mod retry;

pub use client::HttpClient;
pub use error::FetchError;
pub use fetcher::{FetchResult, PageFetcher};
pub use page_url::{is_valid_template, page_url};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

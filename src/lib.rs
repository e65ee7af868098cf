//! Page Downloader Library
//!
//! Downloads the scanned pages of a book, served as individually numbered
//! image files (`<base>/00000012.tif`), in fixed-size concurrent batches while
//! exposing per-page progress to a polling client.
//!
//! # Architecture
//!
//! - [`download`] - page URL construction, the HTTP fetcher, retry policy
//! - [`store`] - where fetched page bytes go (file system or memory)
//! - [`job`] - job validation, batch scheduling, progress tracking and the
//!   single-job [`JobController`]

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod job;
pub mod store;
mod user_agent;

// Re-export commonly used types
pub use download::{
    DEFAULT_MAX_RETRIES, FailureType, FetchError, FetchResult, HttpClient, PageFetcher,
    RetryDecision, RetryPolicy, classify_error, page_url,
};
pub use job::{
    BatchScheduler, DEFAULT_BATCH_SIZE, DownloadJob, FailureKind, JobController, JobError,
    JobSummary, PageFailure, PageStatus, PageUpdate, ProgressReport, ProgressTracker,
    SchedulerOptions, partition_batches,
};
pub use store::{FsPageStore, MemoryPageStore, PageStore, StoreError};

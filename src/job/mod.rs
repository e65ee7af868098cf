//! Download jobs: validation, batch scheduling, progress tracking.
//!
//! A job fetches the pages `[start_page, end_page)` of one book. The
//! [`JobController`] accepts one job at a time and runs it on a background
//! task; the [`BatchScheduler`] walks the range in fixed-size batches; the
//! [`ProgressTracker`] records every page's [`PageStatus`] and hands the
//! changes to whoever polls.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use page_downloader::{HttpClient, JobController, MemoryPageStore, SchedulerOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryPageStore::new();
//! let controller = JobController::new(
//!     Arc::new(HttpClient::new()),
//!     Arc::new(store.clone()),
//!     SchedulerOptions::default(),
//! );
//! controller.start("https://archive.example/data/book/PTIFF/", 1, 41, 10)?;
//! loop {
//!     let report = controller.poll_progress();
//!     for update in &report.updates {
//!         println!("page {} -> {}", update.page, update.status);
//!     }
//!     if report.complete {
//!         break;
//!     }
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//! }
//! println!("{} pages stored", store.len());
//! # Ok(())
//! # }
//! ```

mod controller;
mod scheduler;
mod tracker;

use std::fmt;
use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

use crate::download::{self, FetchError};
use crate::store::StoreError;

pub use controller::JobController;
pub use scheduler::{BatchScheduler, JobSummary, SchedulerOptions, partition_batches};
pub use tracker::ProgressTracker;

/// Default number of pages fetched concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Errors surfaced synchronously when starting a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job parameters are invalid; nothing was started.
    #[error("invalid job configuration: {reason}")]
    Configuration {
        /// What is wrong with the parameters.
        reason: String,
    },

    /// Another job is still running or its completion has not been polled yet.
    #[error("a download job is already active (pages {start_page}..{end_page})")]
    AlreadyActive {
        /// First page of the active job.
        start_page: u32,
        /// End (exclusive) of the active job.
        end_page: u32,
    },
}

impl JobError {
    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// A validated request to download a contiguous range of pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    base_url_template: String,
    start_page: u32,
    end_page: u32,
    batch_size: usize,
}

impl DownloadJob {
    /// Validates and creates a job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Configuration`] if `start_page >= end_page`,
    /// `batch_size` is zero, or the template does not yield an HTTP(S) URL.
    pub fn new(
        base_url_template: impl Into<String>,
        start_page: u32,
        end_page: u32,
        batch_size: usize,
    ) -> Result<Self, JobError> {
        let base_url_template = base_url_template.into();

        if start_page >= end_page {
            return Err(JobError::configuration(format!(
                "empty page range {start_page}..{end_page}: start page must be below end page"
            )));
        }
        if batch_size == 0 {
            return Err(JobError::configuration("batch size must be at least 1"));
        }
        if !download::is_valid_template(&base_url_template) {
            return Err(JobError::configuration(format!(
                "base URL template {base_url_template:?} does not form an http(s) URL"
            )));
        }

        Ok(Self {
            base_url_template,
            start_page,
            end_page,
            batch_size,
        })
    }

    /// Returns the base URL template.
    #[must_use]
    pub fn base_url_template(&self) -> &str {
        &self.base_url_template
    }

    /// Returns the first page number.
    #[must_use]
    pub fn start_page(&self) -> u32 {
        self.start_page
    }

    /// Returns the end page number (exclusive).
    #[must_use]
    pub fn end_page(&self) -> u32 {
        self.end_page
    }

    /// Returns the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the page range.
    #[must_use]
    pub fn pages(&self) -> Range<u32> {
        self.start_page..self.end_page
    }

    /// Returns the number of pages in the job.
    #[must_use]
    pub fn page_count(&self) -> usize {
        (self.end_page - self.start_page) as usize
    }

    /// Returns the URL of `page`.
    #[must_use]
    pub fn page_url(&self, page: u32) -> String {
        download::page_url(&self.base_url_template, page)
    }
}

/// Status of one page within the active job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Not started yet.
    Pending,
    /// Its batch is in flight.
    Downloading,
    /// Fetched and stored.
    Completed,
    /// Fetch or store failed; see the accompanying [`PageFailure`].
    ErrorDownloading,
}

impl PageStatus {
    /// Returns true for statuses that never change again within a job.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::ErrorDownloading)
    }

    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::ErrorDownloading => "error_downloading",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage of a page's handling failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Fetching the page failed (transport, timeout, non-2xx, size cap).
    Network,
    /// The page was fetched but the store refused or failed to persist it.
    Store,
    /// The job was cancelled before the page finished.
    Cancelled,
}

impl FailureKind {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Store => "store",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Why a page ended in [`PageStatus::ErrorDownloading`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
}

impl PageFailure {
    /// Failure for a page whose job was cancelled before it was fetched.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "job cancelled".to_string(),
        }
    }
}

impl From<&FetchError> for PageFailure {
    fn from(error: &FetchError) -> Self {
        let kind = if error.is_cancelled() {
            FailureKind::Cancelled
        } else {
            FailureKind::Network
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl From<&StoreError> for PageFailure {
    fn from(error: &StoreError) -> Self {
        Self {
            kind: FailureKind::Store,
            message: error.to_string(),
        }
    }
}

/// One entry of a progress snapshot: the latest status of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageUpdate {
    /// Page number.
    pub page: u32,
    /// Latest status recorded since the previous drain.
    pub status: PageStatus,
    /// Set when `status` is [`PageStatus::ErrorDownloading`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PageFailure>,
}

/// Result of one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    /// Status changes since the previous poll, ordered by page number.
    pub updates: Vec<PageUpdate>,
    /// True once every page of the job reached a terminal status.
    pub complete: bool,
}

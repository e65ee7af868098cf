//! Constants for the download module (timeouts, page URL layout).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large scans).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default per-page fetch timeout enforced by the scheduler (60 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of digits the page number is zero-padded to in page URLs.
pub const PAGE_NUMBER_WIDTH: usize = 8;

/// Suffix appended to every page URL.
pub const PAGE_EXTENSION: &str = ".tif";

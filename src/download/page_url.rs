//! Page URL construction.
//!
//! Scanned books are served as one image per page, addressed by appending the
//! zero-padded page number and the `.tif` suffix to a per-book base URL:
//!
//! ```
//! use page_downloader::download::page_url;
//!
//! assert_eq!(
//!     page_url("https://archive.example/data/book/PTIFF/", 12),
//!     "https://archive.example/data/book/PTIFF/00000012.tif"
//! );
//! ```

use url::Url;

use super::constants::{PAGE_EXTENSION, PAGE_NUMBER_WIDTH};

/// Builds the URL of `page` from a base URL template.
///
/// Numbers wider than eight digits are written out in full.
#[must_use]
pub fn page_url(base_url_template: &str, page: u32) -> String {
    format!("{base_url_template}{page:0width$}{PAGE_EXTENSION}", width = PAGE_NUMBER_WIDTH)
}

/// Returns true if the template yields an absolute HTTP(S) URL.
#[must_use]
pub fn is_valid_template(base_url_template: &str) -> bool {
    Url::parse(&page_url(base_url_template, 0))
        .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

//! Error types for page stores.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting a page.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error (create directory, write, rename).
    #[error("IO error writing page to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The store refused the page.
    #[error("page {page} rejected: {reason}")]
    Rejected {
        /// The page that was refused.
        page: u32,
        /// Why it was refused.
        reason: String,
    },
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a rejection error.
    pub fn rejected(page: u32, reason: impl Into<String>) -> Self {
        Self::Rejected {
            page,
            reason: reason.into(),
        }
    }
}

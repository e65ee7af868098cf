//! Page persistence.
//!
//! The scheduler hands every successfully fetched page to a [`PageStore`].
//! The store owns the bytes from then on; no format is imposed on them.
//!
//! # Concurrency contract
//!
//! `save` is called concurrently from every fetch task of a batch, always
//! for distinct page numbers. Implementations must tolerate that.

mod error;
mod fs;
mod memory;

use async_trait::async_trait;

pub use error::StoreError;
pub use fs::{DEFAULT_PAGE_EXTENSION, FsPageStore};
pub use memory::MemoryPageStore;

/// Destination for downloaded page bytes.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Persists the bytes of `page`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the page could not be persisted. The page is
    /// then reported as failed; the job carries on.
    async fn save(&self, page: u32, bytes: &[u8]) -> Result<(), StoreError>;
}

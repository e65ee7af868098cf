//! In-memory page store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{PageStore, StoreError};

/// Keeps pages in a concurrent map. Clones share the same pages.
///
/// Useful for embedding the downloader where pages are post-processed in
/// memory, and as a store double in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryPageStore {
    pages: Arc<DashMap<u32, Vec<u8>>>,
}

impl MemoryPageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the bytes stored for `page`.
    #[must_use]
    pub fn get(&self, page: u32) -> Option<Vec<u8>> {
        self.pages.get(&page).map(|entry| entry.value().clone())
    }

    /// Returns true if `page` has been stored.
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    /// Returns the number of stored pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true if no page has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Returns the stored page numbers in ascending order.
    #[must_use]
    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.pages.iter().map(|entry| *entry.key()).collect();
        pages.sort_unstable();
        pages
    }
}

#[async_trait]
impl PageStore for MemoryPageStore {
    async fn save(&self, page: u32, bytes: &[u8]) -> Result<(), StoreError> {
        self.pages.insert(page, bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_save_and_get() {
        let store = MemoryPageStore::new();
        assert!(store.is_empty());

        store.save(3, b"three").await.unwrap();
        store.save(1, b"one").await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(3).as_deref(), Some(&b"three"[..]));
        assert!(store.contains(1));
        assert!(!store.contains(2));
        assert_eq!(store.pages(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_pages() {
        let store = MemoryPageStore::new();
        let handle = store.clone();
        handle.save(9, b"nine").await.unwrap();
        assert!(store.contains(9));
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_distinct_pages() {
        let store = MemoryPageStore::new();
        let mut handles = Vec::new();
        for page in 0..50_u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save(page, &page.to_le_bytes()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 50);
        assert_eq!(store.get(42), Some(42_u32.to_le_bytes().to_vec()));
    }
}

//! File system page store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::{PageStore, StoreError};
use crate::download::constants::PAGE_NUMBER_WIDTH;

/// Default extension for stored pages (matches the served `.tif` scans).
pub const DEFAULT_PAGE_EXTENSION: &str = "tif";

/// Suffix of the temporary file a page is written to before it is renamed.
const PARTIAL_SUFFIX: &str = "part";

/// Writes each page to `<dir>/page_<00000012>.<ext>`.
///
/// Pages are written to a `.part` file first and renamed into place, so a
/// reader never observes a half-written page.
#[derive(Debug, Clone)]
pub struct FsPageStore {
    dir: PathBuf,
    extension: String,
}

impl FsPageStore {
    /// Creates the output directory (and parents) if needed and returns a store over it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    #[instrument(level = "debug", skip(dir), fields(dir = %dir.as_ref().display()))]
    pub async fn create(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(dir.clone(), e))?;
        Ok(Self {
            dir,
            extension: DEFAULT_PAGE_EXTENSION.to_string(),
        })
    }

    /// Uses `extension` (without the dot) for stored pages.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Returns the output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path a page is stored at.
    #[must_use]
    pub fn page_path(&self, page: u32) -> PathBuf {
        self.dir.join(format!(
            "page_{page:0width$}.{ext}",
            width = PAGE_NUMBER_WIDTH,
            ext = self.extension
        ))
    }
}

#[async_trait]
impl PageStore for FsPageStore {
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn save(&self, page: u32, bytes: &[u8]) -> Result<(), StoreError> {
        let final_path = self.page_path(page);
        let mut partial = final_path.clone().into_os_string();
        partial.push(".");
        partial.push(PARTIAL_SUFFIX);
        let partial = PartialFile::new(PathBuf::from(partial));

        write_file(partial.path(), bytes).await?;

        tokio::fs::rename(partial.path(), &final_path)
            .await
            .map_err(|e| StoreError::io(final_path.clone(), e))?;
        partial.commit();

        debug!(path = %final_path.display(), "page stored");
        Ok(())
    }
}

/// Removes the `.part` file on drop unless it was renamed into place.
///
/// Covers both a failed write and a `save` future dropped mid-write.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        debug!(path = %self.path.display(), "removing partial page");
        // NotFound is expected when the write never got as far as creating it.
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file = File::create(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    writer.flush().await.map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_makes_nested_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a").join("b");
        let store = FsPageStore::create(&dir).await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_page_path_is_zero_padded() {
        let temp = TempDir::new().unwrap();
        let store = FsPageStore::create(temp.path()).await.unwrap();
        assert_eq!(
            store.page_path(12),
            temp.path().join("page_00000012.tif")
        );
        let bmp = store.with_extension("bmp");
        assert_eq!(bmp.page_path(3), temp.path().join("page_00000003.bmp"));
    }

    #[tokio::test]
    async fn test_save_writes_bytes_and_leaves_no_partial() {
        let temp = TempDir::new().unwrap();
        let store = FsPageStore::create(temp.path()).await.unwrap();

        store.save(5, b"II*\0scan").await.unwrap();

        let written = tokio::fs::read(store.page_path(5)).await.unwrap();
        assert_eq!(written, b"II*\0scan");
        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the final page file should remain");
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_page() {
        let temp = TempDir::new().unwrap();
        let store = FsPageStore::create(temp.path()).await.unwrap();

        store.save(1, b"old").await.unwrap();
        store.save(1, b"new").await.unwrap();

        assert_eq!(tokio::fs::read(store.page_path(1)).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_fails_with_io() {
        let temp = TempDir::new().unwrap();
        let store = FsPageStore::create(temp.path().join("gone")).await.unwrap();
        std::fs::remove_dir(temp.path().join("gone")).unwrap();

        let result = store.save(1, b"bytes").await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial() {
        let temp = TempDir::new().unwrap();
        let store = FsPageStore::create(temp.path()).await.unwrap();
        // A directory squatting on the final path makes the rename fail.
        std::fs::create_dir(store.page_path(4)).unwrap();

        let result = store.save(4, b"bytes").await;

        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert_eq!(partial_files(temp.path()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_save_leaves_no_partial() {
        let temp = TempDir::new().unwrap();
        let store = FsPageStore::create(temp.path()).await.unwrap();
        let partial_path = temp.path().join("page_00000003.tif.part");
        let bytes = vec![7u8; 64 * 1024 * 1024];

        let partial_seen = async {
            while !partial_path.exists() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };

        // Drop the save as soon as its partial file is on disk, as a
        // cancelled caller would.
        let finished = tokio::select! {
            () = partial_seen => false,
            result = store.save(3, &bytes) => {
                result.unwrap();
                true
            }
        };

        assert_eq!(partial_files(temp.path()), 0, "save finished: {finished}");
    }

    #[test]
    fn test_partial_file_removed_unless_committed() {
        let temp = TempDir::new().unwrap();
        let dropped = temp.path().join("dropped.part");
        let kept = temp.path().join("kept.part");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(PartialFile::new(dropped.clone()));
        PartialFile::new(kept.clone()).commit();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }

    fn partial_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == PARTIAL_SUFFIX))
            .count()
    }
}

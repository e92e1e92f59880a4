//! Storage backend trait and implementations.
//!
//! This module defines the [`StorageBackend`] trait, a small asynchronous
//! file interface for the repository publish tree.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and are validated with
/// [`validate_path`](crate::validate_path) before use; implementations must
/// enforce this.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use jewel_storage::{backend::StorageBackend, error::Result};
///
/// async fn index_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let dir = Path::new("dists/jammy/main/binary-amd64");
///     Ok(backend.list(Some(dir)).await?.iter().map(|info| info.size).sum())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, for logging only.
    fn name(&self) -> &str;

    /// List all files under an optional prefix.
    ///
    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata under an optional prefix.
    ///
    /// Prefixes match whole path components: `dists/jammy` matches
    /// `dists/jammy/Release` but not `dists/jammy-updates/Release`. A prefix
    /// that does not exist yields an empty stream. No ordering is guaranteed.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use jewel_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("dists/jammy/main/binary-amd64")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, replacing any existing file.
    ///
    /// Implementations create parent directories as needed. Readers never see
    /// a partially written file.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Move a file within the backend, replacing the destination.
    ///
    /// Implementations create parent directories of the destination as
    /// needed. On local filesystems the replacement is atomic, which is what
    /// release publishing relies on.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete every file under `prefix`, returning how many were removed.
    async fn delete_all(&self, prefix: &Path) -> Result<usize> {
        let files = self.list(Some(prefix)).await?;
        for file in &files {
            self.delete(&file.path).await?;
        }
        tracing::debug!(backend = %self.name(), prefix = %prefix.display(), count = files.len(), "Deleted files");
        Ok(files.len())
    }
}

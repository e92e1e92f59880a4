//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are kept in an ordered map behind a [`RwLock`], so listings are
/// deterministic and whole trees can be compared with [`snapshot`](Self::snapshot).
///
/// # Examples
///
/// ```
/// use jewel_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("keys/desktop.asc", b"-----BEGIN PGP")]);
/// assert_eq!(backend.read(Path::new("keys/desktop.asc")).await?, b"-----BEGIN PGP");
/// backend.write(Path::new("dists/jammy/main/Release"), b"Origin: jewel\n").await?;
/// assert_eq!(backend.snapshot().await.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    fail_writes: HashSet<PathBuf>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation; a broken test setup should not
    /// pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut map = BTreeMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self { name: "mock".to_string(), storage: RwLock::new(map), fail_writes: HashSet::new() }
    }

    /// Make every write to `path` fail with an I/O error.
    pub fn failing_write(mut self, path: impl AsRef<Path>) -> Self {
        let Ok(validated) = validate_path(path.as_ref()) else {
            panic!("MockBackend::failing_write: invalid path {}", path.as_ref().display());
        };
        self.fail_writes.insert(validated);
        self
    }

    /// All files and their contents, ordered by path.
    pub async fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.storage.read().await.iter().map(|(path, (_, data))| (path.clone(), data.clone())).collect()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .map(|(path, (inserted, data))| FileInfo::new(path.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        if self.fail_writes.contains(&path) {
            let err = std::io::Error::new(std::io::ErrorKind::StorageFull, "simulated write failure");
            exn::bail!(ErrorKind::Io(err));
        }
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        let mut guard = self.storage.write().await;
        let data = guard.remove(&from).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(from)))?;
        guard.insert(to, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("dists/jammy/main/Release"), b"Codename: jammy\n").await.unwrap();
        assert_eq!(backend.read(Path::new("dists/jammy/main/Release")).await.unwrap(), b"Codename: jammy\n");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let err = MockBackend::default().read(Path::new("keys/desktop.asc")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("dists/jammy/main/binary-amd64/b.deb.meta", Vec::from(*b"b")),
            ("dists/jammy/main/binary-amd64/a.deb.meta", Vec::from(*b"a")),
            ("dists/jammy/main/binary-arm64/c.deb.meta", Vec::from(*b"c")),
        ]);
        let files = backend.list(Some(Path::new("dists/jammy/main/binary-amd64"))).await.unwrap();
        let names: Vec<_> = files.iter().filter_map(FileInfo::file_name).collect();
        assert_eq!(names, vec!["a.deb.meta", "b.deb.meta"]);
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let backend = MockBackend::with_files([(".staging/Release", Vec::from(*b"r"))]);
        backend.rename(Path::new(".staging/Release"), Path::new("dists/jammy/main/Release")).await.unwrap();
        assert!(backend.read(Path::new(".staging/Release")).await.is_err());
        backend.delete(Path::new("dists/jammy/main/Release")).await.unwrap();
        let err = backend.delete(Path::new("dists/jammy/main/Release")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failing_write() {
        let backend = MockBackend::default().failing_write("keys/desktop.asc");
        let err = backend.write(Path::new("keys/desktop.asc"), b"key").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Io(_)));
        assert!(backend.snapshot().await.is_empty());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}

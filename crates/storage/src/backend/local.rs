//! Local filesystem storage backend.
//!
//! Files live under a root directory and are accessed through `tokio::fs`.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use jewel_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("repo", "/srv/apt")?;
/// assert_eq!(backend.root().to_str(), Some("/srv/apt"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a backend rooted at an absolute directory, creating it if
    /// missing.
    ///
    /// # Errors
    ///
    /// [`InvalidPath`](ErrorKind::InvalidPath) if the path is relative or
    /// names something other than a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Runs once per run; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path.as_ref())?))
    }

    fn relative_path(&self, absolute: &Path) -> Result<PathBuf> {
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{}` is not within root `{}`", absolute.display(), self.root.display()))
        })?;
        validate_path(relative)
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Classifies one directory entry; kept out of the stream body so errors
    /// can use `?`.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            // Descend into ancestors of the prefix as well as into the prefix itself.
            let on_the_way = prefix.is_none_or(|pfx| relative.starts_with(pfx) || pfx.starts_with(&relative));
            return Ok(if on_the_way { WalkEntry::Descend(path) } else { WalkEntry::Skip });
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            let modified = metadata.modified().map_err(ErrorKind::Io)?;
            return Ok(WalkEntry::File(FileInfo::new(relative, metadata.len(), modified)));
        }
        // Broken symlinks and special files are not part of a repository.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A missing directory lists as empty.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        // Written next to the target, then renamed over it.
        let temp_path = temp_sibling(&abs_path);
        fs::write(&temp_path, data).await.map_err(|e| Self::map_io_error(e, path))?;
        if let Err(err) = fs::rename(&temp_path, &abs_path).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                tracing::warn!(path = %temp_path.display(), error = %cleanup, "Temporary file left behind");
            }
            exn::bail!(Self::map_io_error(err, path));
        }
        tracing::trace!(backend = %self.name, path = %path.display(), bytes = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        tracing::trace!(backend = %self.name, path = %path.display(), "Deleted file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.absolute_path(from)?;
        let to_path = self.absolute_path(to)?;
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, to))?;
        }
        fs::rename(&from_path, &to_path).await.map_err(|e| Self::map_io_error(e, from))?;
        tracing::debug!(backend = %self.name, from = %from.display(), to = %to.display(), "Renamed file");
        Ok(())
    }
}

/// `dir/.{name}.{pid}-{n}.tmp`; unique across concurrent writers.
fn temp_sibling(path: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.{}-{n}.tmp", std::process::id()))
}

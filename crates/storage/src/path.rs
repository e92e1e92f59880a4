//! Path validation for the publish tree.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Validates and normalizes a storage path.
///
/// Paths are relative to the storage root: leading `/` and `.` components are
/// dropped, `..` may only step back into a directory the path itself entered.
/// Empty paths and null bytes are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use jewel_storage::validate_path;
///
/// assert!(validate_path("dists/stable/main/binary-amd64/Packages").is_ok());
/// assert!(validate_path("../etc/apt/sources.list").is_err());
/// assert!(validate_path("pool/\0").is_err());
/// assert_eq!(
///     validate_path("/dists/./stable//main/../main/Release").unwrap(),
///     Path::new("dists/stable/main/Release")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(part) => {
                // Null bytes survive `components()` on Unix but truncate paths in syscalls.
                if part.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(part);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}

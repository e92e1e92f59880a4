//! Per-architecture `Packages` indices.

use crate::error::{ErrorKind, Result};
use crate::model::Group;
use exn::ResultExt;
use jewel_compress::Compression;
use jewel_storage::StorageBackend;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const META_EXTENSION: &str = ".deb.meta";
pub const PACKAGES: &str = "Packages";

/// Folds the claimed `.meta` stanzas of every architecture of `group` into
/// `Packages` and `Packages.gz` under `root`, returning the index paths
/// relative to `root`.
///
/// Stanzas are concatenated in file name order and each `.meta` file is
/// deleted once the uncompressed index is in place. A `.meta` file outside
/// `claimed` did not come from this run (an extraction dropped on failure
/// can still finish its write later) and is deleted unread. Must only run
/// after every extraction of the group has finished.
#[instrument(skip(storage, architectures, claimed), fields(group = %group))]
pub async fn write_indices(
    storage: &dyn StorageBackend,
    root: &Path,
    group: &Group,
    architectures: &BTreeSet<String>,
    claimed: &BTreeSet<PathBuf>,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(architectures.len() * 2);
    for architecture in architectures {
        let dir = root.join(group.binary_dir(architecture));
        let (mut metas, unclaimed): (Vec<PathBuf>, Vec<PathBuf>) = storage
            .list(Some(&dir))
            .await
            .or_raise(|| ErrorKind::Storage)?
            .into_iter()
            .filter(|info| info.path.parent() == Some(dir.as_path()))
            .filter(|info| info.file_name().is_some_and(|name| name.ends_with(META_EXTENSION)))
            .map(|info| info.path)
            .partition(|path| claimed.contains(path));
        for meta in &unclaimed {
            tracing::warn!(path = %meta.display(), "Ignoring .meta file from another run");
            storage.delete(meta).await.or_raise(|| ErrorKind::Storage)?;
        }
        metas.sort();

        let mut packages = Vec::new();
        for meta in &metas {
            packages.extend(storage.read(meta).await.or_raise(|| ErrorKind::Storage)?);
        }
        storage.write(&dir.join(PACKAGES), &packages).await.or_raise(|| ErrorKind::Storage)?;
        for meta in &metas {
            storage.delete(meta).await.or_raise(|| ErrorKind::Storage)?;
        }

        let compressed = Compression::Gzip.compress(&packages).or_raise(|| ErrorKind::Io)?;
        let index_gz = format!("{PACKAGES}{}", Compression::Gzip.extension());
        storage.write(&dir.join(&index_gz), &compressed).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(%architecture, stanzas = metas.len(), "Wrote package index");
        written.push(group.binary_dir(architecture).join(PACKAGES));
        written.push(group.binary_dir(architecture).join(index_gz));
    }
    Ok(written)
}

/// The index files of `architectures` under `root`, keyed by their path
/// relative to the group directory as the release digest wants them.
///
/// Index directories of other architectures are never read.
pub async fn read_indices(
    storage: &dyn StorageBackend,
    root: &Path,
    group: &Group,
    architectures: &BTreeSet<String>,
) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    let dir = root.join(group.dir());
    let mut files = Vec::with_capacity(architectures.len() * 2);
    for architecture in architectures {
        let binary = PathBuf::from(format!("binary-{architecture}"));
        for name in [PACKAGES.to_string(), format!("{PACKAGES}{}", Compression::Gzip.extension())] {
            let relative = binary.join(name);
            let contents = storage.read(&dir.join(&relative)).await.or_raise(|| ErrorKind::Storage)?;
            files.push((relative, contents));
        }
    }
    files.sort();
    Ok(files)
}

/// Index files of `group` in `binary-*` directories of architectures the
/// group no longer has.
pub async fn stale_indices(
    storage: &dyn StorageBackend,
    group: &Group,
    architectures: &BTreeSet<String>,
) -> Result<Vec<PathBuf>> {
    let current: BTreeSet<PathBuf> = architectures.iter().map(|arch| group.binary_dir(arch)).collect();
    let mut stale: Vec<PathBuf> = storage
        .list(Some(&group.dir()))
        .await
        .or_raise(|| ErrorKind::Storage)?
        .into_iter()
        .filter(|info| info.file_name().is_some_and(|name| name.starts_with(PACKAGES)))
        .filter_map(|info| {
            let parent = info.path.parent()?;
            let is_binary = parent.parent() == Some(group.dir().as_path())
                && parent.file_name().is_some_and(|name| name.to_string_lossy().starts_with("binary-"));
            (is_binary && !current.contains(parent)).then_some(info.path)
        })
        .collect();
    stale.sort();
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jewel_storage::backend::MockBackend;

    const STAGED: &str = ".staging";

    fn arches(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|arch| arch.to_string()).collect()
    }

    fn claimed(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[tokio::test]
    async fn test_concatenates_in_name_order() {
        let metas = [
            ".staging/dists/jammy/main/binary-amd64/jewel-1.10.0_amd64.deb.meta",
            ".staging/dists/jammy/main/binary-amd64/jewel-1.9.0_amd64.deb.meta",
            ".staging/dists/jammy/main/binary-arm64/jewel-1.9.0_arm64.deb.meta",
        ];
        let storage = MockBackend::with_files([
            (metas[0], "Package: jewel\nVersion: 1.10.0\n\n"),
            (metas[1], "Package: jewel\nVersion: 1.9.0\n\n"),
            (metas[2], "Package: jewel\nVersion: 1.9.0\n\n"),
        ]);
        let group = Group::new("jammy", "main");

        let written =
            write_indices(&storage, Path::new(STAGED), &group, &arches(&["amd64", "arm64"]), &claimed(&metas))
                .await
                .unwrap();
        let written: Vec<_> = written.iter().map(|path| path.to_string_lossy().into_owned()).collect();
        assert_eq!(
            written,
            [
                "dists/jammy/main/binary-amd64/Packages",
                "dists/jammy/main/binary-amd64/Packages.gz",
                "dists/jammy/main/binary-arm64/Packages",
                "dists/jammy/main/binary-arm64/Packages.gz",
            ]
        );

        let files = storage.snapshot().await;
        let packages = &files[Path::new(".staging/dists/jammy/main/binary-amd64/Packages")];
        assert_eq!(packages, b"Package: jewel\nVersion: 1.10.0\n\nPackage: jewel\nVersion: 1.9.0\n\n");
        let gz = &files[Path::new(".staging/dists/jammy/main/binary-amd64/Packages.gz")];
        assert_eq!(&Compression::Gzip.decompress(gz).unwrap(), packages);
        assert!(files.keys().all(|path| !path.to_string_lossy().ends_with(META_EXTENSION)));
    }

    #[tokio::test]
    async fn test_ignores_other_files() {
        let meta = "dists/jammy/main/binary-amd64/jewel-1.0.0_amd64.deb.meta";
        let storage = MockBackend::with_files([
            (meta, "Package: jewel\n\n"),
            ("dists/jammy/main/binary-amd64/notes.txt", "not a stanza"),
            ("dists/jammy/main/binary-amd64/nested/jewel-0.1.0_amd64.deb.meta", "Package: nested\n\n"),
        ]);
        let group = Group::new("jammy", "main");
        write_indices(&storage, Path::new(""), &group, &arches(&["amd64"]), &claimed(&[meta])).await.unwrap();
        let files = storage.snapshot().await;
        assert_eq!(files[Path::new("dists/jammy/main/binary-amd64/Packages")], b"Package: jewel\n\n");
        assert!(files.contains_key(Path::new("dists/jammy/main/binary-amd64/notes.txt")));
        assert!(files.contains_key(Path::new("dists/jammy/main/binary-amd64/nested/jewel-0.1.0_amd64.deb.meta")));
    }

    #[tokio::test]
    async fn test_unclaimed_stanza_is_dropped() {
        let meta = ".staging/dists/jammy/main/binary-amd64/jewel-1.0.0_amd64.deb.meta";
        let leftover = ".staging/dists/jammy/main/binary-amd64/jewel-0.1.0_amd64.deb.meta";
        let storage = MockBackend::with_files([(meta, "Package: jewel\n\n"), (leftover, "Package: ghost\n\n")]);
        let group = Group::new("jammy", "main");

        write_indices(&storage, Path::new(STAGED), &group, &arches(&["amd64"]), &claimed(&[meta])).await.unwrap();
        let files = storage.snapshot().await;
        assert_eq!(files[Path::new(".staging/dists/jammy/main/binary-amd64/Packages")], b"Package: jewel\n\n");
        assert!(!files.contains_key(Path::new(leftover)));
    }

    #[tokio::test]
    async fn test_rerun_is_stable() {
        let meta = ("dists/jammy/main/binary-amd64/jewel-1.0.0_amd64.deb.meta", "Package: jewel\n\n");
        let group = Group::new("jammy", "main");
        let (architectures, claimed) = (arches(&["amd64"]), claimed(&[meta.0]));
        let storage = MockBackend::with_files([meta]);
        write_indices(&storage, Path::new(""), &group, &architectures, &claimed).await.unwrap();
        let first = storage.snapshot().await;
        storage.write(Path::new(meta.0), meta.1.as_bytes()).await.unwrap();
        write_indices(&storage, Path::new(""), &group, &architectures, &claimed).await.unwrap();
        assert_eq!(storage.snapshot().await, first);
    }

    #[tokio::test]
    async fn test_read_indices_relative_paths() {
        let storage = MockBackend::with_files([
            (".staging/dists/jammy/main/binary-amd64/Packages", "a"),
            (".staging/dists/jammy/main/binary-amd64/Packages.gz", "b"),
            (".staging/dists/jammy/main/Release", "stale"),
            (".staging/dists/jammy/universe/binary-amd64/Packages", "c"),
            ("dists/jammy/main/binary-arm64/Packages", "dropped"),
            ("dists/jammy/main/binary-arm64/Packages.gz", "dropped"),
        ]);
        let group = Group::new("jammy", "main");
        let files = read_indices(&storage, Path::new(STAGED), &group, &arches(&["amd64"])).await.unwrap();
        let paths: Vec<_> = files.iter().map(|(path, _)| path.to_string_lossy().into_owned()).collect();
        assert_eq!(paths, ["binary-amd64/Packages", "binary-amd64/Packages.gz"]);
        assert_eq!(files[0].1, b"a");
    }

    #[tokio::test]
    async fn test_read_indices_missing_index() {
        let storage = MockBackend::with_files([(".staging/dists/jammy/main/binary-amd64/Packages", "a")]);
        let group = Group::new("jammy", "main");
        let err = read_indices(&storage, Path::new(STAGED), &group, &arches(&["amd64"])).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_stale_indices() {
        let storage = MockBackend::with_files([
            ("dists/jammy/main/binary-amd64/Packages", "a"),
            ("dists/jammy/main/binary-arm64/Packages", "b"),
            ("dists/jammy/main/binary-arm64/Packages.gz", "c"),
            ("dists/jammy/main/binary-arm64/notes.txt", "d"),
            ("dists/jammy/main/Release", "e"),
            ("dists/jammy/universe/binary-arm64/Packages", "f"),
        ]);
        let stale = stale_indices(&storage, &Group::new("jammy", "main"), &arches(&["amd64"])).await.unwrap();
        let stale: Vec<_> = stale.iter().map(|path| path.to_string_lossy().into_owned()).collect();
        assert_eq!(stale, ["dists/jammy/main/binary-arm64/Packages", "dists/jammy/main/binary-arm64/Packages.gz"]);
    }
}

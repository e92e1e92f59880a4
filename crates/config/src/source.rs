use crate::error::{ErrorKind, Result};
use crate::{PackageRef, RepoSource};
use exn::ResultExt;
use semver::Version;
use std::path::{Path, PathBuf};

/// Reads a release source directory into a repository tree.
///
/// The layout is `{source}/{distribution}/{component}/{version}.txt`, where
/// each file holds the build number of that version. Packages within a
/// component are ordered by semantic version; versions that are not valid
/// semver sort before all others, by name.
///
/// # Errors
///
/// [`EmptyDirectory`](ErrorKind::EmptyDirectory) if the source, a
/// distribution or a component directory has no entries. Directories nested
/// inside a component are skipped.
#[tracing::instrument(level = "info")]
pub fn scan_source_dir(source: &Path) -> Result<RepoSource> {
    let mut repo = RepoSource::new();
    for distribution in non_empty_dir(source)? {
        if !distribution.is_dir() {
            tracing::info!(path = %distribution.display(), "Skipping file outside of a distribution");
            continue;
        }
        let components = repo.entry(file_name(&distribution)).or_default();
        for component in non_empty_dir(&distribution)? {
            if !component.is_dir() {
                tracing::info!(path = %component.display(), "Skipping file outside of a component");
                continue;
            }
            let packages = scan_component(&component)?;
            if let Some(highest) = packages.last() {
                tracing::info!(
                    component = %component.display(),
                    packages = packages.len(),
                    highest = %highest.version,
                    "Found component"
                );
            }
            components.insert(file_name(&component), packages);
        }
    }
    Ok(repo)
}

fn scan_component(component: &Path) -> Result<Vec<PackageRef>> {
    let mut packages = Vec::new();
    for release in non_empty_dir(component)? {
        if release.is_dir() {
            tracing::info!(path = %release.display(), "Skipping directory");
            continue;
        }
        let Some(version) = release.file_stem().and_then(|stem| stem.to_str()).filter(|_| is_txt(&release)) else {
            tracing::info!(path = %release.display(), "Skipping file without a `.txt` extension");
            continue;
        };
        let build_number = std::fs::read_to_string(&release).or_raise(|| ErrorKind::Io(release.clone()))?;
        let build_number = build_number.trim();
        if build_number.is_empty() {
            exn::bail!(ErrorKind::Invalid {
                key: "build number",
                reason: format!("`{}` does not contain one", release.display()),
            });
        }
        packages.push(PackageRef { version: version.to_string(), build_number: build_number.to_string() });
    }
    packages.sort_by_cached_key(|package| (Version::parse(&package.version).ok(), package.version.clone()));
    Ok(packages)
}

fn non_empty_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .and_then(|entries| entries.map(|entry| entry.map(|entry| entry.path())).collect::<std::io::Result<Vec<_>>>())
        .or_raise(|| ErrorKind::Io(dir.to_path_buf()))?;
    if entries.is_empty() {
        exn::bail!(ErrorKind::EmptyDirectory(dir.to_path_buf()));
    }
    entries.sort();
    Ok(entries)
}

fn is_txt(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == "txt")
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, contents) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_scan() {
        let dir = source(&[
            ("jammy/main/1.10.0.txt", "73\n"),
            ("jammy/main/1.9.2.txt", "64"),
            ("jammy/main/README.md", "ignored"),
            ("noble/beta/2.0.0-rc.1.txt", " 80 \n"),
        ]);
        std::fs::create_dir(dir.path().join("jammy/main/old")).unwrap();

        let repo = scan_source_dir(dir.path()).unwrap();
        assert_eq!(repo.len(), 2);
        let versions: Vec<_> = repo["jammy"]["main"].iter().map(|p| p.version.as_str()).collect();
        assert_eq!(versions, ["1.9.2", "1.10.0"]);
        assert_eq!(repo["jammy"]["main"][1].build_number, "73");
        assert_eq!(repo["noble"]["beta"][0].build_number, "80");
    }

    #[test]
    fn test_non_semver_sorts_first() {
        let dir = source(&[("jammy/main/nightly.txt", "1"), ("jammy/main/0.1.0.txt", "2")]);
        let repo = scan_source_dir(dir.path()).unwrap();
        let versions: Vec<_> = repo["jammy"]["main"].iter().map(|p| p.version.as_str()).collect();
        assert_eq!(versions, ["nightly", "0.1.0"]);
    }

    #[test]
    fn test_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_source_dir(dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyDirectory(path) if path == dir.path()));
    }

    #[test]
    fn test_empty_component() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("jammy/main")).unwrap();
        let err = scan_source_dir(dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyDirectory(path) if path.ends_with("jammy/main")));
    }

    #[test]
    fn test_blank_build_number() {
        let dir = source(&[("jammy/main/1.0.0.txt", "\n")]);
        let err = scan_source_dir(dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { key: "build number", .. }));
    }
}

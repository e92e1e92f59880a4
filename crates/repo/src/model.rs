use derive_more::Display;
use jewel_artifact::Artifact;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// A package version paired with its binary artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebDescriptor {
    pub version: String,
    pub artifact: Artifact,
}

/// Distribution, then component, then the packages published there.
///
/// Architectures are not configured; they come from each package's control
/// file during a run.
pub type DebRepo = BTreeMap<String, BTreeMap<String, Vec<DebDescriptor>>>;

/// One `(distribution, component)` pair; the unit that gets a `Release`.
#[derive(Debug, Clone, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{distribution}/{component}")]
pub struct Group {
    pub distribution: String,
    pub component: String,
}
impl Group {
    pub fn new(distribution: impl Into<String>, component: impl Into<String>) -> Self {
        Self { distribution: distribution.into(), component: component.into() }
    }

    /// `dists/{distribution}/{component}`
    pub fn dir(&self) -> PathBuf {
        ["dists", &self.distribution, &self.component].iter().collect()
    }

    /// `dists/{distribution}/{component}/binary-{architecture}`
    pub fn binary_dir(&self, architecture: &str) -> PathBuf {
        self.dir().join(format!("binary-{architecture}"))
    }
}

/// Architectures discovered per group while packages are extracted.
///
/// Only ever grows during a run. Sets are ordered, so the `Architecture:`
/// line of a release is stable regardless of which extraction finished first.
#[derive(Debug, Default)]
pub struct ArchesByGroup {
    inner: Mutex<BTreeMap<Group, BTreeSet<String>>>,
}
impl ArchesByGroup {
    /// Adds `architecture` to the set of `group`. Returns `true` if it was
    /// not there yet.
    pub fn record(&self, group: &Group, architecture: &str) -> bool {
        // A panic elsewhere cannot leave a half-inserted set behind.
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entry(group.clone()).or_default().insert(architecture.to_string())
    }

    pub fn get(&self, group: &Group) -> Option<BTreeSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).get(group).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<Group, BTreeSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Where a [`plan`](crate::Assembler::plan) run is. Moves strictly forward;
/// any failure ends in [`Failed`](Self::Failed).
#[derive(Debug, Clone, Copy, Default, Display, PartialEq, Eq)]
pub enum AssemblyState {
    #[default]
    Idle,
    Extracting,
    Indexing,
    Releasing,
    Done,
    Failed,
}

/// What a successful run published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Packages extracted and indexed.
    pub packages: usize,
    /// `Packages` and `Packages.gz` files written.
    pub indices: Vec<PathBuf>,
    /// Files committed from staging: indices, releases, signatures and the key.
    pub committed: Vec<PathBuf>,
    /// Index files of architectures that are no longer built, removed after
    /// the commit.
    pub pruned: Vec<PathBuf>,
    pub architectures: BTreeMap<Group, BTreeSet<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_group_paths() {
        let group = Group::new("jammy", "main");
        assert_eq!(group.to_string(), "jammy/main");
        assert_eq!(group.dir(), Path::new("dists/jammy/main"));
        assert_eq!(group.binary_dir("arm64"), Path::new("dists/jammy/main/binary-arm64"));
    }

    #[test]
    fn test_arches_are_a_sorted_union() {
        let arches = ArchesByGroup::default();
        let jammy = Group::new("jammy", "main");
        assert!(arches.record(&jammy, "arm64"));
        assert!(arches.record(&jammy, "amd64"));
        assert!(!arches.record(&jammy, "arm64"));
        arches.record(&Group::new("noble", "main"), "riscv64");

        let jammy_arches: Vec<_> = arches.get(&jammy).unwrap().into_iter().collect();
        assert_eq!(jammy_arches, ["amd64", "arm64"]);
        assert_eq!(arches.snapshot().len(), 2);
        assert!(arches.get(&Group::new("focal", "main")).is_none());
    }

    #[test]
    fn test_arches_concurrent_record() {
        let arches = ArchesByGroup::default();
        let group = Group::new("jammy", "main");
        std::thread::scope(|scope| {
            for arch in ["amd64", "arm64", "armhf", "amd64", "i386", "arm64"] {
                let (arches, group) = (&arches, &group);
                scope.spawn(move || arches.record(group, arch));
            }
        });
        assert_eq!(arches.get(&group).unwrap().len(), 4);
    }
}

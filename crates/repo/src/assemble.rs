use crate::error::{Error, ErrorKind, Result, ResultClassifyExt};
use crate::extract::PackageMetadataExtractor;
use crate::index::{META_EXTENSION, read_indices, stale_indices, write_indices};
use crate::metapointer::{JfrogMetapointer, MetapointerWriter};
use crate::model::{ArchesByGroup, AssemblyReport, AssemblyState, DebDescriptor, DebRepo, Group};
use crate::release::ReleaseSigner;
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use jewel_artifact::{Checksums, ProviderHandle};
use jewel_config::{Config, RepoSource};
use jewel_deb::ControlMetadata;
use jewel_sign::ToolchainHandle;
use jewel_storage::BackendHandle;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::instrument;

/// Everything a run publishes except pool metapointers is written here first
/// and only moved into place once every group has been signed.
pub const STAGING_DIR: &str = ".staging";
pub const KEYS_DIR: &str = "keys";
pub const DEFAULT_CONCURRENCY: usize = 16;

/// What an [`Assembler`] publishes and how hard it may push the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Package name used in pool and index file names.
    pub app_name: String,
    /// `Origin:` of every release.
    pub origin: String,
    /// The public key is published as `keys/{key_file}.asc`.
    pub key_file: String,
    /// Upper bound on extractions in flight.
    pub concurrency: usize,
}
impl Settings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let invalid = || ErrorKind::Configuration("configuration failed validation".to_string());
        config.validate().or_raise(invalid)?;
        Ok(Self {
            app_name: config.app_name().or_raise(invalid)?.to_string(),
            origin: config.origin().or_raise(invalid)?.to_string(),
            key_file: config.gpg.key_file.clone(),
            concurrency: config.deb.concurrency,
        })
    }
}

/// Per-run bookkeeping, dropped when [`Assembler::plan`] returns.
#[derive(Default)]
struct Run {
    arches: ArchesByGroup,
    metas: Mutex<BTreeSet<PathBuf>>,
}
impl Run {
    /// Reserves a `.meta` path; `false` if another package already has it.
    fn claim(&self, meta: &Path) -> bool {
        self.metas.lock().unwrap_or_else(PoisonError::into_inner).insert(meta.to_path_buf())
    }

    fn claimed(&self) -> BTreeSet<PathBuf> {
        self.metas.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Drives a whole repository from package list to signed release files.
///
/// Extraction of every package runs concurrently (bounded by
/// [`Settings::concurrency`]). Indices are only written once every extraction
/// finished, and releases are only signed once every index is written.
/// Indices, release files and the public key are staged under
/// [`STAGING_DIR`] and moved into place together at the very end; a failed
/// run commits none of them.
pub struct Assembler {
    provider: ProviderHandle,
    storage: BackendHandle,
    signer: ReleaseSigner,
    metapointers: Arc<dyn MetapointerWriter>,
    settings: Settings,
    state: Mutex<AssemblyState>,
}

impl Assembler {
    pub fn new(
        provider: ProviderHandle,
        storage: BackendHandle,
        toolchain: ToolchainHandle,
        settings: Settings,
    ) -> Result<Self> {
        if settings.app_name.is_empty() {
            exn::bail!(ErrorKind::Configuration("app name must not be empty".to_string()));
        }
        if settings.concurrency == 0 {
            exn::bail!(ErrorKind::Configuration("concurrency must be at least 1".to_string()));
        }
        let signer = ReleaseSigner::new(toolchain, settings.origin.clone())?;
        let metapointers = Arc::new(JfrogMetapointer::new(Arc::clone(&storage)));
        Ok(Self { provider, storage, signer, metapointers, settings, state: Mutex::new(AssemblyState::Idle) })
    }

    pub fn with_metapointer_writer(mut self, writer: Arc<dyn MetapointerWriter>) -> Self {
        self.metapointers = writer;
        self
    }

    pub fn state(&self) -> AssemblyState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: AssemblyState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = %*state, to = %next, "Assembly state");
        *state = next;
    }

    /// Looks up the `.deb` artifacts of every configured build.
    ///
    /// Every `.deb` of a build becomes one descriptor carrying the configured
    /// version. Components without packages are kept, so that
    /// [`plan`](Self::plan) can reject them.
    #[instrument(skip_all, fields(provider = self.provider.name()))]
    pub async fn resolve(&self, source: &RepoSource) -> Result<DebRepo> {
        let lookups = source
            .iter()
            .flat_map(|(distribution, components)| {
                components.iter().flat_map(move |(component, packages)| {
                    packages.iter().map(move |package| (distribution, component, package))
                })
            })
            .map(|(distribution, component, package)| async move {
                let build = &package.build_number;
                let artifacts = self.provider.deb_artifacts_by_build_number(build).await.or_classify()?;
                if artifacts.is_empty() {
                    exn::bail!(ErrorKind::Configuration(format!(
                        "build {build} of {distribution}/{component} has no .deb artifacts"
                    )));
                }
                tracing::debug!(%distribution, %component, %build, artifacts = artifacts.len(), "Resolved build");
                Ok::<_, Error>((distribution, component, package, artifacts))
            });
        let resolved = futures::future::try_join_all(lookups).await?;

        let mut repo = DebRepo::new();
        for (distribution, components) in source {
            for component in components.keys() {
                repo.entry(distribution.clone()).or_default().entry(component.clone()).or_default();
            }
        }
        for (distribution, component, package, artifacts) in resolved {
            let descriptors = repo.entry(distribution.clone()).or_default().entry(component.clone()).or_default();
            descriptors.extend(
                artifacts.into_iter().map(|artifact| DebDescriptor { version: package.version.clone(), artifact }),
            );
        }
        Ok(repo)
    }

    /// Assembles the repository into storage.
    ///
    /// Fails fast if the working directory cannot be created. On any failure
    /// the state ends as [`Failed`](AssemblyState::Failed), everything staged
    /// is removed, and the published indices and releases are left as they
    /// were. The working directory is always removed.
    #[instrument(skip_all, fields(storage = self.storage.name(), provider = self.provider.name()))]
    pub async fn plan(&self, repo: &DebRepo) -> Result<AssemblyReport> {
        let workdir = match tempfile::Builder::new().prefix("jewel-").tempdir().or_raise(|| ErrorKind::Io) {
            Ok(workdir) => workdir,
            Err(err) => {
                self.transition(AssemblyState::Failed);
                return Err(err);
            },
        };
        let run = Run::default();
        let result = self.run(repo, workdir.path(), &run).await;
        match &result {
            Ok(report) => {
                self.transition(AssemblyState::Done);
                tracing::info!(
                    packages = report.packages,
                    indices = report.indices.len(),
                    committed = report.committed.len(),
                    "Repository assembled"
                );
            },
            Err(err) => {
                self.transition(AssemblyState::Failed);
                tracing::warn!(error = %**err, "Repository assembly failed; rolling back");
                self.roll_back().await;
            },
        }
        if let Err(err) = workdir.close() {
            tracing::warn!(error = %err, "Working directory could not be removed");
        }
        result
    }

    async fn run(&self, repo: &DebRepo, workdir: &Path, run: &Run) -> Result<AssemblyReport> {
        let groups: Vec<Group> = repo
            .iter()
            .flat_map(|(distribution, components)| {
                components.keys().map(move |component| Group::new(distribution, component))
            })
            .collect();
        if groups.is_empty() {
            exn::bail!(ErrorKind::Configuration("repository has no components".to_string()));
        }
        let staging = Path::new(STAGING_DIR);
        let leftovers = self.storage.delete_all(staging).await.or_raise(|| ErrorKind::Storage)?;
        if leftovers > 0 {
            tracing::info!(removed = leftovers, "Cleared staging directory of an earlier run");
        }

        self.transition(AssemblyState::Extracting);
        let extractor = PackageMetadataExtractor::new(Arc::clone(&self.provider), workdir);
        let mut pending: VecDeque<_> = repo
            .iter()
            .flat_map(|(distribution, components)| {
                components.iter().flat_map(move |(component, descriptors)| {
                    descriptors.iter().map(move |descriptor| (Group::new(distribution, component), descriptor))
                })
            })
            .map(|(group, descriptor)| self.process(&extractor, run, group, descriptor))
            .collect();
        let packages = pending.len();
        tracing::info!(packages, groups = groups.len(), concurrency = self.settings.concurrency, "Extracting");
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.drain(..self.settings.concurrency.min(pending.len())));
        while let Some(result) = processing.next().await {
            // Returning drops every extraction still in flight.
            result?;
            if let Some(next) = pending.pop_front() {
                processing.push(next);
            }
        }

        // Every extraction has finished: the architecture sets are final.
        self.transition(AssemblyState::Indexing);
        let architectures = run.arches.snapshot();
        let claimed = run.claimed();
        let mut indices = Vec::new();
        for (group, arches) in &architectures {
            indices.extend(write_indices(self.storage.as_ref(), staging, group, arches, &claimed).await?);
        }
        let mut staged: Vec<_> = indices.iter().map(|live| (staging.join(live), live.clone())).collect();

        // Every index is written: releases can digest them.
        self.transition(AssemblyState::Releasing);
        for group in &groups {
            let arches = architectures
                .get(group)
                .ok_or_else(|| Error::from(ErrorKind::Configuration(format!("{group} has no packages"))))?;
            let files = read_indices(self.storage.as_ref(), staging, group, arches).await?;
            let signed = self.signer.sign(group, arches, files).await?;
            for (name, contents) in signed.files() {
                staged.push(self.stage(&group.dir().join(name), contents).await?);
            }
        }
        let key = self.signer.public_key().await?;
        let key_path = Path::new(KEYS_DIR).join(format!("{}.asc", self.settings.key_file));
        staged.push(self.stage(&key_path, &key).await?);

        let mut committed = Vec::with_capacity(staged.len());
        for (from, live) in staged {
            self.storage.rename(&from, &live).await.or_raise(|| ErrorKind::Storage)?;
            committed.push(live);
        }
        let pruned = self.prune(&architectures).await;
        Ok(AssemblyReport { packages, indices, committed, pruned, architectures })
    }

    /// Extracts one package and records everything the later barriers need.
    #[instrument(skip_all, fields(group = %group, artifact = %descriptor.artifact.name))]
    async fn process(
        &self,
        extractor: &PackageMetadataExtractor,
        run: &Run,
        group: Group,
        descriptor: &DebDescriptor,
    ) -> Result<()> {
        let package = extractor.extract(&descriptor.artifact).await?;
        if package.version != descriptor.version {
            tracing::warn!(
                configured = %descriptor.version,
                control = %package.version,
                "Configured version differs from the package's control file"
            );
        }
        let architecture = package.architecture.as_str();
        if !is_architecture(architecture) {
            tracing::warn!(%architecture, "Unusable architecture name");
            exn::bail!(ErrorKind::Parse);
        }

        let stem = format!("{}-{}_{architecture}", self.settings.app_name, descriptor.version);
        let deb_name = format!("{stem}.deb");
        let meta = Path::new(STAGING_DIR).join(group.binary_dir(architecture)).join(format!("{stem}{META_EXTENSION}"));
        if !run.claim(&meta) {
            exn::bail!(ErrorKind::Configuration(format!("more than one package maps to {}", meta.display())));
        }
        let filename = pool_path(&self.settings.app_name, &group, &deb_name);
        let stanza = stanza(&package.control, &filename, &package.checksums);
        self.storage.write(&meta, stanza.as_bytes()).await.or_raise(|| ErrorKind::Storage)?;
        if run.arches.record(&group, architecture) {
            tracing::debug!(%architecture, "New architecture");
        }
        self.metapointers.create_metapointer(&package.checksums.md5, Path::new(&filename)).await
    }

    async fn stage(&self, live: &Path, contents: &[u8]) -> Result<(PathBuf, PathBuf)> {
        let staging = Path::new(STAGING_DIR).join(live);
        self.storage.write(&staging, contents).await.or_raise(|| ErrorKind::Storage)?;
        Ok((staging, live.to_path_buf()))
    }

    /// Removes index files of architectures a group no longer has, so that
    /// `dists/` only holds what the new releases describe. Runs after the
    /// commit, so failures are only logged.
    async fn prune(&self, architectures: &BTreeMap<Group, BTreeSet<String>>) -> Vec<PathBuf> {
        let mut pruned = Vec::new();
        for (group, arches) in architectures {
            let stale = match stale_indices(self.storage.as_ref(), group, arches).await {
                Ok(stale) => stale,
                Err(err) => {
                    tracing::warn!(group = %group, error = ?err, "Could not look for dropped architectures");
                    continue;
                },
            };
            for path in stale {
                match self.storage.delete(&path).await {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "Removed index of dropped architecture");
                        pruned.push(path);
                    },
                    Err(err) => tracing::warn!(path = %path.display(), error = ?err, "Stale index left behind"),
                }
            }
        }
        pruned
    }

    /// Best effort: a failure here must not hide the error that caused it.
    ///
    /// A write of an extraction dropped by the failure may still land in
    /// staging afterwards; the next run clears staging first and only folds
    /// `.meta` files it claimed itself.
    async fn roll_back(&self) {
        match self.storage.delete_all(Path::new(STAGING_DIR)).await {
            Ok(0) => {},
            Ok(removed) => tracing::info!(removed, "Removed staged files"),
            Err(err) => tracing::warn!(error = ?err, "Staged files could not be removed"),
        }
    }
}

/// `pool/{component}/{first letter}/{app}/{distribution}/{deb}`
pub(crate) fn pool_path(app_name: &str, group: &Group, deb_name: &str) -> String {
    let initial: String = app_name.chars().take(1).collect();
    format!("pool/{}/{initial}/{app_name}/{}/{deb_name}", group.component, group.distribution)
}

/// The control paragraph followed by the location and checksum fields, and
/// the blank line that ends a `Packages` record.
pub(crate) fn stanza(control: &ControlMetadata, filename: &str, checksums: &Checksums) -> String {
    format!(
        "{control}Filename: {filename}\nSize: {}\nSHA1: {}\nSHA256: {}\nMD5Sum: {}\n\n",
        checksums.size, checksums.sha1, checksums.sha256, checksums.md5
    )
}

/// Architecture names end up in paths; Debian only uses `[a-z0-9-]`.
fn is_architecture(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

//! Layered configuration for jewel.
//!
//! Values are read from a TOML file and then overridden from the command
//! line (which itself falls back to environment variables). Every section has
//! defaults, so a file only needs the keys that matter for a run.

pub mod error;
mod source;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::source::scan_source_dir;

/// One published package version and the CI build that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PackageRef {
    pub version: String,
    pub build_number: String,
}

/// Distribution, then component, then the packages published there.
pub type RepoSource = BTreeMap<String, BTreeMap<String, Vec<PackageRef>>>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub artifactory: ArtifactorySection,
    pub gpg: GpgSection,
    pub deb: DebSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactorySection {
    pub host: Option<String>,
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    /// Value of `CI_RUNNER_TAGS` identifying the build run whose artifacts
    /// are published.
    pub runner_tag: String,
    pub timeout_secs: u64,
}
impl ArtifactorySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
impl Default for ArtifactorySection {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            api_key: None,
            project: None,
            repository: None,
            runner_tag: "tvd-runner".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpgSection {
    pub key_name: Option<String>,
    /// Published as `keys/{key_file}.asc`.
    pub key_file: String,
}
impl Default for GpgSection {
    fn default() -> Self {
        Self { key_name: None, key_file: "desktop".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebSection {
    pub app_name: Option<String>,
    pub origin: Option<String>,
    /// Upper bound on package extractions in flight.
    pub concurrency: usize,
    pub repo: RepoSource,
}
impl Default for DebSection {
    fn default() -> Self {
        Self { app_name: None, origin: None, concurrency: 16, repo: RepoSource::new() }
    }
}

/// Values given on the command line or through the environment; they take
/// precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub artifactory_host: Option<String>,
    pub artifactory_user: Option<String>,
    pub artifactory_api_key: Option<String>,
    pub artifactory_project: Option<String>,
    pub artifactory_repository: Option<String>,
    pub gpg_key_name: Option<String>,
    pub concurrency: Option<usize>,
}

impl Config {
    /// Platform configuration file, e.g. `~/.config/jewel/jewel.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "jewel").map(|dirs| dirs.config_dir().join("jewel.toml"))
    }

    /// Loads and validates the configuration.
    ///
    /// An explicit `file` must exist; without one the platform default is
    /// read if present.
    #[tracing::instrument(level = "debug", skip(overrides))]
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::Io(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        let mut figment = Figment::new();
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "Reading configuration file");
            figment = figment.merge(Toml::file(path));
        }
        let strings = [
            ("artifactory.host", &overrides.artifactory_host),
            ("artifactory.user", &overrides.artifactory_user),
            ("artifactory.api_key", &overrides.artifactory_api_key),
            ("artifactory.project", &overrides.artifactory_project),
            ("artifactory.repository", &overrides.artifactory_repository),
            ("gpg.key_name", &overrides.gpg_key_name),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                figment = figment.merge(Serialized::default(key, value));
            }
        }
        if let Some(concurrency) = overrides.concurrency {
            figment = figment.merge(Serialized::default("deb.concurrency", concurrency));
        }
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the keys every run needs. Artifactory credentials are checked
    /// by the provider that uses them.
    pub fn validate(&self) -> Result<()> {
        let app_name = self.app_name()?;
        if !is_package_name(app_name) {
            exn::bail!(ErrorKind::Invalid {
                key: "deb.app_name",
                reason: format!("`{app_name}` is not a valid Debian package name"),
            });
        }
        self.origin()?;
        if self.deb.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid { key: "deb.concurrency", reason: "must be at least 1".to_string() });
        }
        if self.gpg.key_file.is_empty() || self.gpg.key_file.contains('/') {
            exn::bail!(ErrorKind::Invalid { key: "gpg.key_file", reason: "must be a plain file name".to_string() });
        }
        Ok(())
    }

    pub fn app_name(&self) -> Result<&str> {
        required(&self.deb.app_name, "deb.app_name")
    }

    pub fn origin(&self) -> Result<&str> {
        required(&self.deb.origin, "deb.origin")
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => exn::bail!(ErrorKind::Missing(key)),
    }
}

/// Debian policy 5.6.7: lowercase alphanumerics plus `+ - .`, at least two
/// characters, starting with an alphanumeric.
fn is_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    starts_ok
        && name.len() >= 2
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
}

//! Signed release metadata.

use crate::error::{ErrorKind, Result};
use crate::model::Group;
use exn::ResultExt;
use jewel_sign::{SigningToolchain, ToolchainHandle};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;
use upon::{Engine, Template};

pub const RELEASE: &str = "Release";
pub const RELEASE_GPG: &str = "Release.gpg";
pub const IN_RELEASE: &str = "InRelease";

const LABEL: &str = "Ubuntu/Debian";
const TEMPLATE: &str = "\
Origin: {{ origin }}
Label: {{ label }}
Architecture: {{ architectures }}
Component: {{ component }}
Codename: {{ codename }}
";

/// The three release files of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRelease {
    pub release: Vec<u8>,
    pub release_gpg: Vec<u8>,
    pub in_release: Vec<u8>,
}
impl SignedRelease {
    /// `(file name, contents)` in the order they are published.
    pub fn files(&self) -> [(&'static str, &[u8]); 3] {
        [
            (RELEASE, self.release.as_slice()),
            (RELEASE_GPG, self.release_gpg.as_slice()),
            (IN_RELEASE, self.in_release.as_slice()),
        ]
    }
}

/// Renders `Release` files and has the toolchain digest and sign them.
pub struct ReleaseSigner {
    engine: Engine<'static>,
    template: Template<'static>,
    toolchain: ToolchainHandle,
    origin: String,
}

impl ReleaseSigner {
    pub fn new(toolchain: ToolchainHandle, origin: impl Into<String>) -> Result<Self> {
        let engine = Engine::new();
        let template = engine.compile(TEMPLATE.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template, toolchain, origin: origin.into() })
    }

    /// The unsigned head of the `Release` file, before the digest block.
    pub fn render(&self, group: &Group, architectures: &BTreeSet<String>) -> Result<String> {
        let architectures = architectures.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        self.template
            .render(
                &self.engine,
                upon::value! {
                    origin: &self.origin,
                    label: LABEL,
                    architectures: architectures,
                    component: &group.component,
                    codename: &group.distribution,
                },
            )
            .to_string()
            .or_raise(|| ErrorKind::Template)
    }

    /// Produces `Release`, `Release.gpg` and `InRelease` for a group.
    ///
    /// `indices` are the group's index files relative to its directory. The
    /// digest is appended first; both signatures cover the digested file.
    #[instrument(skip(self, architectures, indices), fields(group = %group))]
    pub async fn sign(
        &self,
        group: &Group,
        architectures: &BTreeSet<String>,
        indices: Vec<(PathBuf, Vec<u8>)>,
    ) -> Result<SignedRelease> {
        let head = self.render(group, architectures)?;
        let toolchain = Arc::clone(&self.toolchain);
        tokio::task::spawn_blocking(move || sign_with(toolchain.as_ref(), head, &indices))
            .await
            .or_raise(|| ErrorKind::Io)?
    }

    /// The armored public key clients verify the releases with.
    pub async fn public_key(&self) -> Result<Vec<u8>> {
        let toolchain = Arc::clone(&self.toolchain);
        tokio::task::spawn_blocking(move || toolchain.export_public_key())
            .await
            .or_raise(|| ErrorKind::Io)?
            .or_raise(|| ErrorKind::ToolInvocation)
    }
}

fn sign_with(toolchain: &dyn SigningToolchain, head: String, indices: &[(PathBuf, Vec<u8>)]) -> Result<SignedRelease> {
    let mut release = head.into_bytes();
    release.extend(toolchain.digest(indices).or_raise(|| ErrorKind::ToolInvocation)?);
    let release_gpg = toolchain.detach_sign(&release).or_raise(|| ErrorKind::ToolInvocation)?;
    let in_release = toolchain.clear_sign(&release).or_raise(|| ErrorKind::ToolInvocation)?;
    Ok(SignedRelease { release, release_gpg, in_release })
}

//! External signing toolchain.
//!
//! Release files are digested with `apt-ftparchive` and signed with `gpg`.
//! Both run as blocking subprocesses; async callers should invoke them from
//! the blocking pool.

pub mod error;
#[cfg(any(test, feature = "mock"))]
mod fake;
mod system;

use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(any(test, feature = "mock"))]
pub use crate::fake::{FAKE_PUBLIC_KEY, FakeToolchain};
pub use crate::system::SystemToolchain;

pub type ToolchainHandle = Arc<dyn SigningToolchain>;

/// The four operations release signing needs from the outside world.
pub trait SigningToolchain: Send + Sync {
    /// Produces the checksum block appended to a `Release` file.
    ///
    /// `files` are the index files of one component directory, keyed by
    /// their path relative to it (`binary-amd64/Packages.gz`).
    fn digest(&self, files: &[(PathBuf, Vec<u8>)]) -> Result<Vec<u8>>;

    /// An armored detached signature over `data` (`Release.gpg`).
    fn detach_sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// `data` wrapped in a clear-signed message (`InRelease`).
    fn clear_sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// The armored public half of the signing key.
    fn export_public_key(&self) -> Result<Vec<u8>>;
}

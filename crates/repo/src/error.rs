//! Repository Error Types
//!
//! Every failure of a run is one of these kinds; child crates' errors stay
//! attached underneath as the error tree.

use derive_more::{Display, Error};
use jewel_artifact::error::ErrorKind as ArtifactErrorKind;
use jewel_deb::error::ErrorKind as DebErrorKind;

/// A repository assembly error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for repository assembly operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Package bytes are not a conforming `.deb` or its control file is
    /// malformed.
    #[display("package metadata could not be parsed")]
    Parse,
    /// The provider did not vouch for the content it returned.
    #[display("package integrity metadata missing or inconsistent")]
    Integrity,
    /// Talking to the artifact provider failed.
    #[display("artifact provider request failed")]
    Transport,
    #[display("invalid repository configuration: {_0}")]
    Configuration(#[error(not(source))] String),
    /// `apt-ftparchive` or `gpg` failed.
    #[display("signing toolchain failed")]
    ToolInvocation,
    /// Reading or writing the publish tree failed.
    #[display("publish tree storage failed")]
    Storage,
    #[display("I/O error")]
    Io,
    #[display("release template could not be rendered")]
    Template,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }
}

/// Maps a child crate's error kind onto the category a run reports.
pub(crate) trait Classify {
    fn classify(&self) -> ErrorKind;
}

impl Classify for ArtifactErrorKind {
    fn classify(&self) -> ErrorKind {
        match self {
            Self::MissingIntegrity(_) => ErrorKind::Integrity,
            Self::BuildNotFound(build) => ErrorKind::Configuration(format!("build {build} not found")),
            Self::ModuleCount { build, modules } => {
                ErrorKind::Configuration(format!("build {build} has {modules} modules, expected one"))
            },
            Self::Configuration(reason) => ErrorKind::Configuration(reason.clone()),
            Self::Network(_) | Self::Timeout | Self::Status(_) | Self::InvalidResponse(_) | Self::NotFound(_) => {
                ErrorKind::Transport
            },
        }
    }
}

impl Classify for DebErrorKind {
    fn classify(&self) -> ErrorKind {
        match self {
            Self::Interrupted => ErrorKind::Transport,
            Self::Io => ErrorKind::Io,
            _ => ErrorKind::Parse,
        }
    }
}

pub(crate) trait ResultClassifyExt<T> {
    /// Raises the classified kind over the child error.
    fn or_classify(self) -> Result<T>;
}

impl<T, E> ResultClassifyExt<T> for std::result::Result<T, exn::Exn<E>>
where
    E: Classify + std::error::Error + Send + Sync + 'static,
{
    fn or_classify(self) -> Result<T> {
        self.map_err(|err| {
            let kind = err.classify();
            err.raise(kind)
        })
    }
}

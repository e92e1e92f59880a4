//! Artifact provider trait and implementations.
//!
//! A provider answers two questions: which artifacts did a build publish, and
//! what are the bytes (or a window of the bytes) of one of those artifacts.
//! Content is always streamed; integrity metadata travels next to the stream.

#[cfg(feature = "artifactory")]
mod artifactory;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "artifactory")]
pub use self::artifactory::{ArtifactoryConfig, ArtifactoryProvider};
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockProvider;
use crate::error::{ErrorKind, Result};
use crate::models::{Artifact, ByteRange, ContentMetadata};
use async_trait::async_trait;
use exn::ResultExt;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

pub type BoxAsyncRead = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// A content response: integrity metadata plus the (possibly partial) body.
pub struct ArtifactContent {
    pub metadata: ContentMetadata,
    pub reader: BoxAsyncRead,
}

/// Unified interface for artifact repositories.
///
/// # Examples
///
/// ```no_run
/// use jewel_artifact::{ArtifactProvider, ByteRange, error::Result};
///
/// async fn size_field(provider: &dyn ArtifactProvider, build: &str) -> Result<Vec<Vec<u8>>> {
///     let mut fields = Vec::new();
///     for artifact in provider.deb_artifacts_by_build_number(build).await? {
///         let (_metadata, bytes) = provider.read_range(&artifact, ByteRange::from(120..=129)).await?;
///         fields.push(bytes);
///     }
///     Ok(fields)
/// }
/// ```
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    /// Name of the provider, used for logging only.
    fn name(&self) -> &str;

    /// All artifacts published by a build.
    ///
    /// Returns [`BuildNotFound`](ErrorKind::BuildNotFound) if the provider
    /// knows no such build.
    async fn artifacts_by_build_number(&self, build_number: &str) -> Result<Vec<Artifact>>;

    /// The `.deb` artifacts published by a build.
    async fn deb_artifacts_by_build_number(&self, build_number: &str) -> Result<Vec<Artifact>> {
        let artifacts = self.artifacts_by_build_number(build_number).await?;
        Ok(artifacts.into_iter().filter(Artifact::is_deb).collect())
    }

    /// Opens a content stream for the artifact, limited to `range` when given.
    async fn content(&self, artifact: &Artifact, range: Option<ByteRange>) -> Result<ArtifactContent>;

    /// Reads a (small) byte window fully into memory.
    async fn read_range(&self, artifact: &Artifact, range: ByteRange) -> Result<(ContentMetadata, Vec<u8>)> {
        let ArtifactContent { metadata, mut reader } = self.content(artifact, Some(range)).await?;
        let mut bytes = Vec::with_capacity(usize::try_from(range.len()).unwrap_or(0));
        reader
            .read_to_end(&mut bytes)
            .await
            .or_raise(|| ErrorKind::Network(format!("reading {range} of {}", artifact.name)))?;
        Ok((metadata, bytes))
    }
}

//! Build artifact lookup and ranged content streaming.
//!
//! The [`ArtifactProvider`] trait is the only thing the repository pipeline
//! knows about where packages live. Providers:
//!
//! - [`ArtifactoryProvider`] (feature `artifactory`): JFrog Artifactory build
//!   info and content API.
//! - [`MockProvider`] (feature `mock`): in-memory, records every request.

pub mod error;
mod models;
pub mod provider;

pub use crate::models::{Artifact, ByteRange, Checksums, ContentMetadata, ContentRange};
#[cfg(feature = "artifactory")]
pub use crate::provider::{ArtifactoryConfig, ArtifactoryProvider};
#[cfg(any(test, feature = "mock"))]
pub use crate::provider::MockProvider;
pub use crate::provider::{ArtifactContent, ArtifactProvider, BoxAsyncRead};
use std::sync::Arc;

pub type ProviderHandle = Arc<dyn ArtifactProvider + Send + Sync>;

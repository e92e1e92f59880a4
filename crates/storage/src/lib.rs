//! Storage for the publish tree of an assembled repository.
//!
//! Everything the pipeline writes (`dists/`, `pool/`, `keys/` and the staging
//! area for release files) goes through a [`StorageBackend`], so the whole run
//! can be exercised against [`MockBackend`](backend::MockBackend) in tests.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;

//! Pool entries that point at package bytes instead of holding them.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use jewel_storage::BackendHandle;
use std::path::Path;

/// Registers a package under its pool path without copying the package.
#[async_trait]
pub trait MetapointerWriter: Send + Sync {
    async fn create_metapointer(&self, md5: &str, destination: &Path) -> Result<()>;
}

/// The JFrog metapointer document for content with this md5.
///
/// ```
/// assert_eq!(
///     jewel_repo::metapointer_content("d41d8cd98f00b204e9800998ecf8427e"),
///     "#metapointer jfrogart\noid md5:d41d8cd98f00b204e9800998ecf8427e"
/// );
/// ```
pub fn metapointer_content(md5: &str) -> String {
    format!("#metapointer jfrogart\noid md5:{md5}")
}

/// Writes JFrog metapointer documents into the publish tree; the object
/// store resolves them to the real package when the tree is uploaded.
pub struct JfrogMetapointer {
    storage: BackendHandle,
}
impl JfrogMetapointer {
    pub fn new(storage: BackendHandle) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl MetapointerWriter for JfrogMetapointer {
    async fn create_metapointer(&self, md5: &str, destination: &Path) -> Result<()> {
        tracing::debug!(%md5, destination = %destination.display(), "Writing metapointer");
        self.storage
            .write(destination, metapointer_content(md5).as_bytes())
            .await
            .or_raise(|| ErrorKind::Storage)
    }
}

//! Assembly of a signed APT repository from packages that stay remote.
//!
//! A run reads only the control member of every package (two range requests
//! each), writes per-architecture `Packages` indices, and signs one `Release`
//! per `(distribution, component)`. Package bytes are never copied: the pool
//! holds [metapointers](MetapointerWriter) instead.
//!
//! ```text
//! dists/{dist}/{comp}/binary-{arch}/Packages{,.gz}
//! dists/{dist}/{comp}/{Release,Release.gpg,InRelease}
//! keys/{key_file}.asc
//! pool/{comp}/{a}/{app}/{dist}/{app}-{version}_{arch}.deb
//! ```

mod assemble;
pub mod error;
mod extract;
mod index;
mod metapointer;
mod model;
mod release;

pub use crate::assemble::{Assembler, DEFAULT_CONCURRENCY, KEYS_DIR, STAGING_DIR, Settings};
pub use crate::extract::{ExtractedPackage, PackageMetadataExtractor};
pub use crate::index::{META_EXTENSION, PACKAGES, read_indices, stale_indices, write_indices};
pub use crate::metapointer::{JfrogMetapointer, MetapointerWriter, metapointer_content};
pub use crate::model::{ArchesByGroup, AssemblyReport, AssemblyState, DebDescriptor, DebRepo, Group};
pub use crate::release::{IN_RELEASE, RELEASE, RELEASE_GPG, ReleaseSigner, SignedRelease};

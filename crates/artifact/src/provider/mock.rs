//! In-memory artifact provider for testing.

use super::{ArtifactContent, ArtifactProvider};
use crate::error::{ErrorKind, Result};
use crate::models::{Artifact, ByteRange, ContentMetadata, ContentRange};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;

/// In-memory artifact provider for testing.
///
/// Builds map to artifacts, artifacts map (by `md5`) to their bytes. Every
/// content request is recorded so tests can assert on the exact windows that
/// were asked for.
///
/// # Examples
///
/// ```
/// use jewel_artifact::{Artifact, ArtifactProvider, ByteRange, MockProvider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let artifact = MockProvider::artifact("demo_1.0_amd64.deb", "0123456789abcdef0123456789abcdef");
/// let provider = MockProvider::default().with_build("41", [(artifact.clone(), b"!<arch>\n".to_vec())]);
/// let (_metadata, bytes) = provider.read_range(&artifact, ByteRange::from(0..=6)).await?;
/// assert_eq!(bytes, b"!<arch>");
/// assert_eq!(provider.requests(), vec![(artifact.md5.clone(), Some(ByteRange::from(0..=6)))]);
/// # Ok(())
/// # }
/// ```
pub struct MockProvider {
    name: String,
    builds: HashMap<String, Vec<Artifact>>,
    content: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<(String, Option<ByteRange>)>>,
    omit_checksums: bool,
    failing: HashSet<String>,
}

impl MockProvider {
    /// An artifact record whose checksums are derived from `md5` so that
    /// every field is populated and unique.
    pub fn artifact(name: impl Into<String>, md5: impl Into<String>) -> Artifact {
        let name = name.into();
        let md5 = md5.into();
        Artifact {
            path: format!("builds/{name}"),
            kind: "deb".to_string(),
            sha1: format!("{md5:0>40}"),
            sha256: format!("{md5:0>64}"),
            md5,
            name,
        }
    }

    /// Registers a build and the content of each of its artifacts.
    pub fn with_build(
        mut self,
        build_number: impl Into<String>,
        artifacts: impl IntoIterator<Item = (Artifact, Vec<u8>)>,
    ) -> Self {
        let mut records = Vec::new();
        for (artifact, bytes) in artifacts {
            self.content.insert(artifact.md5.clone(), bytes);
            records.push(artifact);
        }
        self.builds.entry(build_number.into()).or_default().extend(records);
        self
    }

    /// Answer content requests without `X-Checksum-*` metadata.
    pub fn without_checksums(mut self) -> Self {
        self.omit_checksums = true;
        self
    }

    /// Make content requests for the artifact with this `md5` fail with a
    /// transport error.
    pub fn failing_on(mut self, md5: impl Into<String>) -> Self {
        self.failing.insert(md5.into());
        self
    }

    /// Content requests received so far, as `(md5, range)`.
    pub fn requests(&self) -> Vec<(String, Option<ByteRange>)> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}
impl Default for MockProvider {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            builds: HashMap::new(),
            content: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            omit_checksums: false,
            failing: HashSet::new(),
        }
    }
}

#[async_trait]
impl ArtifactProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn artifacts_by_build_number(&self, build_number: &str) -> Result<Vec<Artifact>> {
        self.builds
            .get(build_number)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::BuildNotFound(build_number.to_string())))
    }

    async fn content(&self, artifact: &Artifact, range: Option<ByteRange>) -> Result<ArtifactContent> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((artifact.md5.clone(), range));
        }
        if self.failing.contains(&artifact.md5) {
            exn::bail!(ErrorKind::Network(format!("connection reset while fetching {}", artifact.name)));
        }
        let bytes = self
            .content
            .get(&artifact.md5)
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(artifact.name.clone())))?;
        let total = bytes.len() as u64;
        let (start, end) = match range {
            Some(range) if range.start >= total => exn::bail!(ErrorKind::Status(416)),
            Some(range) => (range.start, range.end.min(total.saturating_sub(1))),
            None if total == 0 => exn::bail!(ErrorKind::Status(416)),
            None => (0, total - 1),
        };
        let window = bytes[start as usize..=end as usize].to_vec();
        let checksum = |value: &str| (!self.omit_checksums).then(|| value.to_string());
        let metadata = ContentMetadata {
            content_range: Some(ContentRange { start, end, total: Some(total) }),
            sha1: checksum(&artifact.sha1),
            sha256: checksum(&artifact.sha256),
            md5: checksum(&artifact.md5),
        };
        Ok(ArtifactContent { metadata, reader: Box::pin(Cursor::new(window)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    fn provider() -> MockProvider {
        let artifact = MockProvider::artifact("a_1.0_amd64.deb", MD5);
        MockProvider::default().with_build("7", [(artifact, b"0123456789".to_vec())])
    }

    #[tokio::test]
    async fn test_artifacts_by_build_number() {
        let provider = provider();
        let artifacts = provider.deb_artifacts_by_build_number("7").await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].location(), "builds/a_1.0_amd64.deb");
        let err = provider.artifacts_by_build_number("8").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BuildNotFound(_)));
    }

    #[tokio::test]
    async fn test_range_is_clamped_to_content() {
        let provider = provider();
        let artifact = MockProvider::artifact("a_1.0_amd64.deb", MD5);
        let (metadata, bytes) = provider.read_range(&artifact, ByteRange::from(6..=20)).await.unwrap();
        assert_eq!(bytes, b"6789");
        assert_eq!(metadata.content_range, Some(ContentRange { start: 6, end: 9, total: Some(10) }));
        assert_eq!(metadata.checksums().unwrap().size, 10);
    }

    #[tokio::test]
    async fn test_range_past_end() {
        let artifact = MockProvider::artifact("a_1.0_amd64.deb", MD5);
        let err = provider().read_range(&artifact, ByteRange::from(10..=12)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Status(416));
    }

    #[tokio::test]
    async fn test_without_checksums() {
        let provider = provider().without_checksums();
        let artifact = MockProvider::artifact("a_1.0_amd64.deb", MD5);
        let (metadata, _) = provider.read_range(&artifact, ByteRange::from(0..=1)).await.unwrap();
        assert!(metadata.checksums().is_err());
    }

    #[tokio::test]
    async fn test_failing_on_records_request() {
        let provider = provider().failing_on(MD5);
        let artifact = MockProvider::artifact("a_1.0_amd64.deb", MD5);
        let err = provider.content(&artifact, None).await.err().unwrap();
        assert!(err.is_transport());
        assert_eq!(provider.requests(), vec![(MD5.to_string(), None)]);
    }
}

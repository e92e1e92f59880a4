//! Package metadata from two small range requests.

use crate::error::{ErrorKind, Result, ResultClassifyExt};
use exn::ResultExt;
use jewel_artifact::{Artifact, ArtifactContent, ByteRange, Checksums, ProviderHandle};
use jewel_deb::{
    CONTROL_SIZE_FIELD, ControlMetadata, control_member_range, extract_control, parse_member_size, read_control,
};
use std::path::PathBuf;
use tokio_util::io::SyncIoBridge;
use tracing::instrument;

/// Everything the index needs to know about one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPackage {
    pub version: String,
    pub architecture: String,
    /// Provider-reported, never computed locally.
    pub checksums: Checksums,
    pub control: ControlMetadata,
}

/// Reads the control metadata of remote packages without downloading them.
///
/// The first request reads the control member's size field; the second
/// streams exactly that member, which is unpacked on the blocking pool into a
/// directory of its own (named after the artifact's md5) under `workdir`. The
/// directory is removed again once the control file has been parsed, whether
/// or not that succeeded.
pub struct PackageMetadataExtractor {
    provider: ProviderHandle,
    workdir: PathBuf,
}

impl PackageMetadataExtractor {
    pub fn new(provider: ProviderHandle, workdir: impl Into<PathBuf>) -> Self {
        Self { provider, workdir: workdir.into() }
    }

    #[instrument(skip_all, fields(artifact = %artifact.name, md5 = %artifact.md5))]
    pub async fn extract(&self, artifact: &Artifact) -> Result<ExtractedPackage> {
        let (_, field) = self.provider.read_range(artifact, ByteRange::from(CONTROL_SIZE_FIELD)).await.or_classify()?;
        let size = parse_member_size(&field).or_classify()?;
        let range = ByteRange::from(control_member_range(size).or_classify()?);
        tracing::debug!(size, %range, "Fetching control member");

        let ArtifactContent { metadata, reader } = self.provider.content(artifact, Some(range)).await.or_classify()?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", artifact.md5))
            .tempdir_in(&self.workdir)
            .or_raise(|| ErrorKind::Io)?;
        let into = scratch.path().to_path_buf();
        let bridge = SyncIoBridge::new(reader);
        let control = tokio::task::spawn_blocking(move || read_control(&extract_control(bridge, &into)?))
            .await
            .or_raise(|| ErrorKind::Io)?
            .or_classify()?;
        drop(scratch);

        let checksums = metadata.checksums().or_classify()?;
        if !checksums.md5.eq_ignore_ascii_case(&artifact.md5) {
            tracing::warn!(reported = %checksums.md5, "Content md5 does not match the build record");
            exn::bail!(ErrorKind::Integrity);
        }
        Ok(ExtractedPackage {
            version: control.version().to_string(),
            architecture: control.architecture().to_string(),
            checksums,
            control,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jewel_artifact::MockProvider;
    use jewel_compress::Compression;
    use jewel_deb::fixture;
    use rstest::rstest;
    use std::sync::Arc;

    const MD5: &str = "9e107d9d372bb6826bd81d3542a419d6";
    const CONTROL: &str = "\
Package: jewel
Version: 1.4.0
Architecture: arm64
Maintainer: Jewel Team <jewel@example.com>
Description: Desktop client
 Ships the desktop client.
";

    fn setup(provider: MockProvider) -> (tempfile::TempDir, Arc<MockProvider>, PackageMetadataExtractor) {
        let workdir = tempfile::tempdir().unwrap();
        let provider = Arc::new(provider);
        let extractor = PackageMetadataExtractor::new(provider.clone(), workdir.path());
        (workdir, provider, extractor)
    }

    fn with_deb(bytes: Vec<u8>) -> (Artifact, MockProvider) {
        let artifact = MockProvider::artifact("jewel_1.4.0_arm64.deb", MD5);
        let provider = MockProvider::default().with_build("41", [(artifact.clone(), bytes)]);
        (artifact, provider)
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Xz)]
    #[case(Compression::Zstd)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_matches_full_download(#[case] compression: Compression) {
        let deb = fixture::deb(CONTROL, compression);
        let expected = ControlMetadata::parse(&fixture::control_from_full_deb(&deb)).unwrap();
        let (artifact, provider) = with_deb(deb);
        let (workdir, _provider, extractor) = setup(provider);

        let package = extractor.extract(&artifact).await.unwrap();
        assert_eq!(package.control, expected);
        assert_eq!(package.version, "1.4.0");
        assert_eq!(package.architecture, "arm64");
        assert_eq!(package.checksums.md5, MD5);
        assert_eq!(std::fs::read_dir(workdir.path()).unwrap().count(), 0, "scratch directory left behind");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_range_requests() {
        let junk = [0u8; 45];
        let deb = fixture::ar(&[("debian-binary", &b"2.0\n"[..]), ("control.tar", &junk[..])]);
        let (artifact, provider) = with_deb(deb);
        let (_workdir, provider, extractor) = setup(provider);

        let err = extractor.extract(&artifact).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Parse);
        assert_eq!(
            provider.requests(),
            vec![
                (MD5.to_string(), Some(ByteRange::from(120..=129))),
                (MD5.to_string(), Some(ByteRange::from(132..=176))),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_numeric_size_field() {
        let mut deb = fixture::deb(CONTROL, Compression::Gzip);
        deb[120..130].copy_from_slice(b"forty-five");
        let (artifact, provider) = with_deb(deb);
        let (_workdir, provider, extractor) = setup(provider);

        let err = extractor.extract(&artifact).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Parse);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_architecture() {
        let deb = fixture::deb("Package: jewel\nVersion: 1.4.0\n", Compression::Gzip);
        let (artifact, provider) = with_deb(deb);
        let (workdir, _provider, extractor) = setup(provider);

        let err = extractor.extract(&artifact).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Parse);
        assert_eq!(std::fs::read_dir(workdir.path()).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_control_member_without_control_file() {
        let control_tar = fixture::control_tar(&[("./md5sums", &b"abc  usr/bin/jewel\n"[..])], Compression::Gzip);
        let deb = fixture::ar(&[("debian-binary", &b"2.0\n"[..]), ("control.tar.gz", control_tar.as_slice())]);
        let (artifact, provider) = with_deb(deb);
        let (_workdir, _provider, extractor) = setup(provider);

        assert_eq!(*extractor.extract(&artifact).await.unwrap_err(), ErrorKind::Parse);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_checksums() {
        let (artifact, provider) = with_deb(fixture::deb(CONTROL, Compression::Xz));
        let (_workdir, _provider, extractor) = setup(provider.without_checksums());

        assert_eq!(*extractor.extract(&artifact).await.unwrap_err(), ErrorKind::Integrity);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transport_failure() {
        let (artifact, provider) = with_deb(fixture::deb(CONTROL, Compression::Gzip));
        let (_workdir, _provider, extractor) = setup(provider.failing_on(MD5));

        let err = extractor.extract(&artifact).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Transport);
        assert!(err.is_retryable());
    }
}

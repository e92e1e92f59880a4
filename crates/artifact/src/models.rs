//! Artifact models.
//!
//! [`Artifact`] mirrors the artifact records of a build-info document; the
//! remaining types describe a ranged content response.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Identity record of a build artifact. Immutable once obtained.
///
/// `md5` is the content key: it names the extraction directory and the
/// metapointer of the package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Location inside the artifact repository. Older build-info documents
    /// omit it, in which case the name is the location.
    #[serde(default)]
    pub path: String,
    pub sha1: String,
    pub sha256: String,
    pub md5: String,
}
impl Artifact {
    /// Repository-relative location used to fetch the content.
    pub fn location(&self) -> &str {
        if self.path.is_empty() { &self.name } else { &self.path }
    }

    pub fn is_deb(&self) -> bool {
        self.name.ends_with(".deb")
    }
}

/// Inclusive byte window of a content request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}
impl ByteRange {
    /// Number of bytes covered by the window.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// A window always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Range` header value, e.g. `bytes=120-129`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}
impl From<RangeInclusive<u64>> for ByteRange {
    fn from(range: RangeInclusive<u64>) -> Self {
        Self { start: *range.start(), end: *range.end() }
    }
}
impl Display for ByteRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Parsed `Content-Range` header: `bytes {start}-{end}/{total}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// Full length of the artifact; `None` when the provider answered `*`.
    pub total: Option<u64>,
}
impl FromStr for ContentRange {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ErrorKind::InvalidResponse(format!("Content-Range: {s}"));
        let rest = s.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
        let (window, total) = rest.split_once('/').ok_or_else(invalid)?;
        let (start, end) = window.split_once('-').ok_or_else(invalid)?;
        let start = start.trim().parse().map_err(|_| invalid())?;
        let end = end.trim().parse().map_err(|_| invalid())?;
        let total = match total.trim() {
            "*" => None,
            total => Some(total.parse().map_err(|_| invalid())?),
        };
        if end < start {
            exn::bail!(invalid());
        }
        Ok(Self { start, end, total })
    }
}

/// Integrity metadata returned with every content response.
///
/// Checksums describe the whole artifact, never the requested window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentMetadata {
    pub content_range: Option<ContentRange>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub md5: Option<String>,
}
impl ContentMetadata {
    /// Collects the checksums of the artifact, failing on the first missing
    /// value with [`ErrorKind::MissingIntegrity`].
    pub fn checksums(&self) -> Result<Checksums> {
        let size = self
            .content_range
            .and_then(|range| range.total)
            .ok_or_else(|| exn::Exn::from(ErrorKind::MissingIntegrity("Content-Range")))?;
        let required = |value: &Option<String>, name: &'static str| -> Result<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| exn::Exn::from(ErrorKind::MissingIntegrity(name)))
        };
        Ok(Checksums {
            size,
            sha1: required(&self.sha1, "X-Checksum-Sha1")?,
            sha256: required(&self.sha256, "X-Checksum-Sha256")?,
            md5: required(&self.md5, "X-Checksum-Md5")?,
        })
    }
}

/// Size and digests of a package, copied verbatim into its index stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    pub size: u64,
    pub sha1: String,
    pub sha256: String,
    pub md5: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn metadata() -> ContentMetadata {
        ContentMetadata {
            content_range: Some("bytes 132-176/4096".parse().unwrap()),
            sha1: Some("da39a3ee5e6b4b0d3255bfef95601890afd80709".into()),
            sha256: Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".into()),
            md5: Some("d41d8cd98f00b204e9800998ecf8427e".into()),
        }
    }

    #[test]
    fn test_artifact_from_build_info() {
        let artifact: Artifact = serde_json::from_str(
            r#"{"type":"deb","name":"jewel-desktop_1.0.0_amd64.deb","sha1":"a","sha256":"b","md5":"c"}"#,
        )
        .unwrap();
        assert_eq!(artifact.kind, "deb");
        assert_eq!(artifact.location(), "jewel-desktop_1.0.0_amd64.deb");
        assert!(artifact.is_deb());
    }

    #[test]
    fn test_byte_range() {
        let range = ByteRange::from(120..=129);
        assert_eq!(range.len(), 10);
        assert_eq!(range.header_value(), "bytes=120-129");
        assert_eq!(range.to_string(), "[120, 129]");
    }

    #[rstest]
    #[case("bytes 120-129/4096", 120, 129, Some(4096))]
    #[case("bytes 0-0/1", 0, 0, Some(1))]
    #[case("bytes 132-176/*", 132, 176, None)]
    fn test_content_range(#[case] header: &str, #[case] start: u64, #[case] end: u64, #[case] total: Option<u64>) {
        assert_eq!(header.parse::<ContentRange>().unwrap(), ContentRange { start, end, total });
    }

    #[rstest]
    #[case("120-129/4096")]
    #[case("bytes 129-120/4096")]
    #[case("bytes a-b/c")]
    #[case("bytes 120-129")]
    fn test_content_range_invalid(#[case] header: &str) {
        let err = header.parse::<ContentRange>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidResponse(_)));
    }

    #[test]
    fn test_checksums() {
        let checksums = metadata().checksums().unwrap();
        assert_eq!(checksums.size, 4096);
        assert_eq!(checksums.md5, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_checksums_missing() {
        let mut missing_md5 = metadata();
        missing_md5.md5 = Some("  ".into());
        assert_eq!(*missing_md5.checksums().unwrap_err(), ErrorKind::MissingIntegrity("X-Checksum-Md5"));

        let mut unknown_size = metadata();
        unknown_size.content_range = Some("bytes 132-176/*".parse().unwrap());
        assert_eq!(*unknown_size.checksums().unwrap_err(), ErrorKind::MissingIntegrity("Content-Range"));
    }
}

//! JFrog Artifactory provider.
//!
//! Builds are looked up through the build-info REST API and content is read
//! from the configured repository with `Range` requests. Checksums come from
//! the `X-Checksum-*` response headers, which always describe the whole file.

use super::{ArtifactContent, ArtifactProvider};
use crate::error::{ErrorKind, Result};
use crate::models::{Artifact, ByteRange, ContentMetadata, ContentRange};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::OnceCell;
use tokio_util::io::StreamReader;
use tracing::instrument;

const RUNNER_TAGS_PROPERTY: &str = "buildInfo.env.CI_RUNNER_TAGS";
const SHA1_HEADER: &str = "X-Checksum-Sha1";
const SHA256_HEADER: &str = "X-Checksum-Sha256";
const MD5_HEADER: &str = "X-Checksum-Md5";

/// Connection settings of an [`ArtifactoryProvider`].
#[derive(Debug, Clone)]
pub struct ArtifactoryConfig {
    /// Host name, optionally with a scheme (`https://` is assumed otherwise).
    pub host: String,
    pub user: String,
    pub api_key: String,
    /// Build-info project key.
    pub project: String,
    /// Repository holding the published packages.
    pub repository: String,
    /// Value of `CI_RUNNER_TAGS` identifying the Linux builds.
    pub runner_tag: String,
    pub timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildList {
    #[serde(default)]
    builds_numbers: Vec<BuildRef>,
}

#[derive(Debug, Deserialize)]
struct BuildRef {
    uri: String,
    started: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfoDocument {
    build_info: BuildInfo,
}

#[derive(Deserialize)]
struct BuildInfo {
    #[serde(default)]
    modules: Vec<Module>,
    #[serde(default)]
    properties: HashMap<String, String>,
}

#[derive(Deserialize)]
struct Module {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

/// Artifactory-backed [`ArtifactProvider`].
///
/// The build list is fetched once, on first use (or eagerly through
/// [`init`](Self::init)), and reused for every build lookup of the run.
pub struct ArtifactoryProvider {
    name: String,
    config: ArtifactoryConfig,
    client: Client,
    builds: OnceCell<Vec<BuildRef>>,
}
impl ArtifactoryProvider {
    pub fn new(name: impl Into<String>, config: ArtifactoryConfig) -> Result<Self> {
        for (key, value) in [
            ("artifactory.host", &config.host),
            ("artifactory.user", &config.user),
            ("artifactory.api_key", &config.api_key),
            ("artifactory.project", &config.project),
            ("artifactory.repository", &config.repository),
        ] {
            if value.trim().is_empty() {
                exn::bail!(ErrorKind::Configuration(format!("{key} must be specified")));
            }
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("jewel/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Configuration("HTTP client".to_string()))?;
        Ok(Self { name: name.into(), config, client, builds: OnceCell::new() })
    }

    /// Loads the build list of the project.
    pub async fn init(&self) -> Result<()> {
        self.builds().await.map(|builds| tracing::debug!(builds = builds.len(), "Loaded build list"))
    }

    fn base_url(&self) -> String {
        let host = self.config.host.trim_end_matches('/');
        if host.starts_with("https://") || host.starts_with("http://") {
            format!("{host}/artifactory")
        } else {
            format!("https://{host}/artifactory")
        }
    }

    fn builds_url(&self) -> String {
        format!("{}/api/build/{}", self.base_url(), self.config.project)
    }

    async fn builds(&self) -> Result<&[BuildRef]> {
        self.builds
            .get_or_try_init(|| async {
                let list: BuildList = self.get_json(self.client.get(self.builds_url())).await?;
                Ok::<_, crate::error::Error>(list.builds_numbers)
            })
            .await
            .map(Vec::as_slice)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response =
            request.basic_auth(&self.config.user, Some(&self.config.api_key)).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %response.url(), status = status.as_u16(), "Artifactory request failed");
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let url = response.url().to_string();
        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).or_raise(|| ErrorKind::InvalidResponse(url))
    }

    async fn build_info(&self, build_number: &str, started: &str) -> Result<BuildInfo> {
        let request = self
            .client
            .get(format!("{}/{build_number}", self.builds_url()))
            .query(&[("started", normalize_started(started))]);
        let document: BuildInfoDocument = self.get_json(request).await?;
        Ok(document.build_info)
    }
}

#[async_trait]
impl ArtifactProvider for ArtifactoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(provider = %self.name, runner = %self.config.runner_tag))]
    async fn artifacts_by_build_number(&self, build_number: &str) -> Result<Vec<Artifact>> {
        let uri = format!("/{build_number}");
        let runs: Vec<&str> =
            self.builds().await?.iter().filter(|b| b.uri == uri).map(|b| b.started.as_str()).collect();
        tracing::debug!(runs = runs.len(), "Resolving build runs");
        // One build number may have been produced by several pipelines (one
        // per platform); the runner tag tells them apart.
        let infos =
            futures::future::try_join_all(runs.iter().map(|started| self.build_info(build_number, started))).await?;
        for info in infos {
            if info.properties.get(RUNNER_TAGS_PROPERTY) != Some(&self.config.runner_tag) {
                continue;
            }
            if info.modules.len() != 1 {
                exn::bail!(ErrorKind::ModuleCount { build: build_number.to_string(), modules: info.modules.len() });
            }
            return Ok(info.modules.into_iter().flat_map(|module| module.artifacts).collect());
        }
        exn::bail!(ErrorKind::BuildNotFound(format!("{build_number} (runner {})", self.config.runner_tag)))
    }

    #[instrument(skip(self, artifact), fields(provider = %self.name, artifact = %artifact.name, range = ?range))]
    async fn content(&self, artifact: &Artifact, range: Option<ByteRange>) -> Result<ArtifactContent> {
        let location = artifact.location().trim_start_matches('/');
        let url = format!("{}/{}/{location}", self.base_url(), self.config.repository);
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        let response = self.send(request).await?;
        if range.is_some() && response.status() != StatusCode::PARTIAL_CONTENT {
            // The whole file would follow; refuse rather than parse the wrong window.
            exn::bail!(ErrorKind::InvalidResponse(format!("range ignored by server ({})", response.status())));
        }
        let metadata = content_metadata(response.headers(), response.content_length())?;
        let stream = response.bytes_stream().map_err(|err| io::Error::new(io::ErrorKind::ConnectionAborted, err));
        Ok(ArtifactContent { metadata, reader: Box::pin(StreamReader::new(stream)) })
    }
}

fn transport_error(err: reqwest::Error) -> exn::Exn<ErrorKind> {
    let kind = if err.is_timeout() { ErrorKind::Timeout } else { ErrorKind::Network(err.to_string()) };
    exn::Exn::from(err).raise(kind)
}

/// Reads integrity headers. A full (non-ranged) response has no
/// `Content-Range`, its length then stands in for the total size.
fn content_metadata(headers: &HeaderMap, content_length: Option<u64>) -> Result<ContentMetadata> {
    let text = |name: &str| headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string);
    let content_range = match headers.get(CONTENT_RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .or_raise(|| ErrorKind::InvalidResponse("Content-Range is not ASCII".to_string()))?;
            Some(value.parse::<ContentRange>()?)
        },
        None => content_length
            .filter(|len| *len > 0)
            .map(|len| ContentRange { start: 0, end: len - 1, total: Some(len) }),
    };
    Ok(ContentMetadata { content_range, sha1: text(SHA1_HEADER), sha256: text(SHA256_HEADER), md5: text(MD5_HEADER) })
}

/// Build list timestamps look like `2024-03-01T09:15:02.123+0000`; the
/// build-info endpoint expects them in UTC with a `Z` suffix. Unknown formats
/// are passed through untouched.
fn normalize_started(started: &str) -> String {
    let input = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory][offset_minute]"
    );
    let output = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    OffsetDateTime::parse(started, input)
        .ok()
        .and_then(|time| time.to_offset(time::UtcOffset::UTC).format(output).ok())
        .unwrap_or_else(|| started.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    fn config() -> ArtifactoryConfig {
        ArtifactoryConfig {
            host: "artifacts.example.com".into(),
            user: "ci".into(),
            api_key: "secret".into(),
            project: "jewel".into(),
            repository: "jewel-releases".into(),
            runner_tag: "tvd-runner".into(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_new_requires_settings() {
        assert!(ArtifactoryProvider::new("artifactory", config()).is_ok());
        let mut missing = config();
        missing.api_key = " ".into();
        let err = ArtifactoryProvider::new("artifactory", missing).err().unwrap();
        assert_eq!(*err, ErrorKind::Configuration("artifactory.api_key must be specified".into()));
    }

    #[rstest]
    #[case("artifacts.example.com", "https://artifacts.example.com/artifactory/api/build/jewel")]
    #[case("http://localhost:8081/", "http://localhost:8081/artifactory/api/build/jewel")]
    fn test_builds_url(#[case] host: &str, #[case] expected: &str) {
        let config = ArtifactoryConfig { host: host.into(), ..config() };
        let provider = ArtifactoryProvider::new("artifactory", config).unwrap();
        assert_eq!(provider.builds_url(), expected);
    }

    #[rstest]
    #[case("2024-03-01T09:15:02.123+0000", "2024-03-01T09:15:02.123Z")]
    #[case("2024-03-01T11:15:02.123+0200", "2024-03-01T09:15:02.123Z")]
    #[case("yesterday", "yesterday")]
    fn test_normalize_started(#[case] started: &str, #[case] expected: &str) {
        assert_eq!(normalize_started(started), expected);
    }

    #[test]
    fn test_content_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 120-129/5120"));
        headers.insert("x-checksum-sha1", HeaderValue::from_static("aa"));
        headers.insert("x-checksum-sha256", HeaderValue::from_static("bb"));
        headers.insert("x-checksum-md5", HeaderValue::from_static("cc"));
        let metadata = content_metadata(&headers, Some(10)).unwrap();
        let checksums = metadata.checksums().unwrap();
        assert_eq!(checksums.size, 5120);
        assert_eq!((checksums.sha1.as_str(), checksums.sha256.as_str(), checksums.md5.as_str()), ("aa", "bb", "cc"));
    }

    #[test]
    fn test_content_metadata_without_range() {
        let metadata = content_metadata(&HeaderMap::new(), Some(2048)).unwrap();
        assert_eq!(metadata.content_range, Some(ContentRange { start: 0, end: 2047, total: Some(2048) }));
        assert_eq!(*metadata.checksums().unwrap_err(), ErrorKind::MissingIntegrity("X-Checksum-Sha1"));
    }

    #[test]
    fn test_build_info_document() {
        let document: BuildInfoDocument = serde_json::from_str(
            r#"{"buildInfo": {
                "properties": {"buildInfo.env.CI_RUNNER_TAGS": "tvd-runner"},
                "modules": [{"artifacts": [
                    {"type": "deb", "name": "jewel_1.0.0_amd64.deb", "sha1": "a", "sha256": "b", "md5": "c"},
                    {"type": "txt", "name": "notes.txt", "sha1": "d", "sha256": "e", "md5": "f"}
                ]}]
            }}"#,
        )
        .unwrap();
        assert_eq!(document.build_info.properties.get(RUNNER_TAGS_PROPERTY).map(String::as_str), Some("tvd-runner"));
        assert_eq!(document.build_info.modules[0].artifacts.len(), 2);
    }

    #[test]
    fn test_build_list_document() {
        let list: BuildList = serde_json::from_str(
            r#"{"uri": "x", "buildsNumbers": [{"uri": "/41", "started": "2024-03-01T09:15:02.123+0000"}]}"#,
        )
        .unwrap();
        assert_eq!(list.builds_numbers[0].uri, "/41");
    }
}

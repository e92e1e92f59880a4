//! Artifact Provider Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An artifact provider error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for artifact provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection could not be established or broke off.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The provider did not answer in time.
    #[display("request timed out")]
    Timeout,
    /// The provider answered with an unexpected HTTP status.
    #[display("unexpected status code: {_0}")]
    Status(#[error(not(source))] u16),
    /// No build matched the requested number (and runner).
    #[display("build not found: {_0}")]
    BuildNotFound(#[error(not(source))] String),
    /// A build must publish its artifacts from exactly one module.
    #[display("build {build} has {modules} modules, expected exactly one")]
    ModuleCount {
        build: String,
        modules: usize,
    },
    /// The response body or a header could not be understood.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// A content response lacks a checksum or size header.
    #[display("missing integrity metadata: {_0}")]
    MissingIntegrity(#[error(not(source))] &'static str),
    /// The requested artifact is unknown to the provider.
    #[display("artifact not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The provider could not be constructed from its configuration.
    #[display("invalid provider configuration: {_0}")]
    Configuration(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// Returns `true` for failures of the transport itself rather than of the
    /// data it carried.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::Status(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Timeout, true)]
    #[case(ErrorKind::Network("reset".into()), true)]
    #[case(ErrorKind::Status(503), true)]
    #[case(ErrorKind::Status(429), true)]
    #[case(ErrorKind::Status(404), false)]
    #[case(ErrorKind::MissingIntegrity("X-Checksum-Md5"), false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_transport_classification() {
        assert!(ErrorKind::Status(404).is_transport());
        assert!(!ErrorKind::BuildNotFound("7".into()).is_transport());
        assert!(!ErrorKind::MissingIntegrity("Content-Range").is_transport());
    }
}

//! Package Parsing Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A package parsing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for package parsing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The `ar` member size field is not an ASCII decimal number.
    #[display("invalid ar member size field: {_0:?}")]
    MemberSize(#[error(not(source))] String),
    /// The control member declares a size of zero bytes.
    #[display("control member is empty")]
    EmptyMember,
    /// The control archive has no `control` file.
    #[display("no control file inside control archive")]
    ControlNotFound,
    /// The control archive could not be decoded (corrupt or truncated).
    #[display("control archive could not be decoded")]
    Archive,
    /// The byte stream feeding the control archive broke off mid-read.
    #[display("control archive stream interrupted")]
    Interrupted,
    /// A required control field is missing or empty.
    #[display("missing required control field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// A control line is neither `Key: value` nor a continuation line.
    #[display("malformed control line {line}: {content:?}")]
    MalformedLine {
        /// One-based line number within the control file.
        line: usize,
        /// The offending line.
        content: String,
    },
    /// Reading the extracted control file failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted | Self::Io)
    }

    /// Returns `true` if the package bytes themselves are at fault.
    pub fn is_malformed(&self) -> bool {
        !self.is_retryable()
    }
}

//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The layered configuration could not be read or did not match the
    /// expected shape.
    #[display("configuration could not be loaded")]
    Load,
    #[display("{_0} must be specified")]
    Missing(#[error(not(source))] &'static str),
    #[display("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[display("directory `{}` is empty", _0.display())]
    EmptyDirectory(#[error(not(source))] PathBuf),
    #[display("`{}` could not be read", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

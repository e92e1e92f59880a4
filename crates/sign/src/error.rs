//! Signing Error Types

use derive_more::{Display, Error};

/// A signing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for signing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("`{_0}` not found in PATH")]
    ToolNotFound(#[error(not(source))] &'static str),
    /// The tool ran but reported failure. `code` is `None` when it was killed
    /// by a signal.
    #[display("`{tool}` exited unsuccessfully (code: {code:?})")]
    ToolFailed { tool: &'static str, code: Option<i32> },
    #[display("`{_0}` produced no output")]
    EmptyOutput(#[error(not(source))] &'static str),
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

//! Version Control Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A version control error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for version control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No `git` executable on `PATH`.
    #[display("git executable not found")]
    GitNotFound,
    /// The `git` process could not be started.
    #[display("unable to run git")]
    Spawn,
    /// `git` ran and exited unsuccessfully.
    #[display("git {args} failed: {stderr}")]
    Command { args: String, stderr: String },
    /// `git` produced output that could not be understood.
    #[display("unexpected git output: {_0}")]
    InvalidOutput(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Network operations (clone, fetch) fail transiently.
        matches!(self, Self::Command { .. } | Self::Spawn)
    }
}

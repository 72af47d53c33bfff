//! Synchronisation Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A synchronisation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for synchronisation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested branch is not registered.
    #[display("branch not found: {_0}")]
    BranchNotFound(#[error(not(source))] String),
    /// The layer selection matched nothing.
    #[display("no layers to update")]
    NoLayers,
    /// Another run held the lock for longer than the timeout.
    #[display("lock timeout expired: {}", _0.display())]
    LockTimeout(#[error(not(source))] PathBuf),
    /// The lock file could not be opened or locked.
    #[display("unable to lock {}", _0.display())]
    Lock(#[error(not(source))] PathBuf),
    /// Fetching was requested and every repository failed.
    #[display("no repositories could be fetched")]
    NothingFetched,
    /// The parser toolkit could not be fetched or prepared.
    #[display("parser toolkit unavailable")]
    Toolkit,
    #[display("index storage error")]
    Storage,
    #[display("repository error")]
    Repository,
    /// The layer's checkout does not look like a layer.
    #[display("invalid layer: {_0}")]
    InvalidLayer(#[error(not(source))] String),
    /// A branch the layer was indexed on has disappeared from its repository.
    #[display("branch no longer exists: {_0}")]
    MissingBranch(#[error(not(source))] String),
    /// The layer's subdirectory is absent on the tracked branch.
    #[display("subdirectory does not exist: {_0}")]
    MissingSubdirectory(#[error(not(source))] String),
    /// A layer dependency string could not be parsed.
    #[display("invalid dependency specification: {_0}")]
    InvalidDependency(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_) | Self::Storage | Self::Repository)
    }

    /// Returns `true` if the whole run must stop, rather than a single layer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BranchNotFound(_)
                | Self::NoLayers
                | Self::LockTimeout(_)
                | Self::Lock(_)
                | Self::NothingFetched
                | Self::Toolkit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_classification() {
        assert!(ErrorKind::LockTimeout(PathBuf::from("x")).is_fatal());
        assert!(ErrorKind::LockTimeout(PathBuf::from("x")).is_retryable());
        assert!(!ErrorKind::InvalidLayer("meta-foo".to_string()).is_fatal());
        assert_eq!(ErrorKind::BranchNotFound("dunfell".to_string()).to_string(), "branch not found: dunfell");
    }
}

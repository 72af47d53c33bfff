//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A metadata file could not be read from disk.
    #[display("unable to read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// A statement in a metadata file could not be understood.
    #[display("parse error in {} at line {line}: {statement}", file.display())]
    Syntax {
        file: PathBuf,
        line: usize,
        statement: String,
    },
    /// A `require` directive referenced a file that does not exist.
    #[display("required file not found: {_0}")]
    MissingRequire(#[error(not(source))] String),
    /// Includes nested deeper than the evaluator allows (most likely a cycle).
    #[display("include depth exceeded while reading {}", _0.display())]
    IncludeDepth(#[error(not(source))] PathBuf),
    /// The layer has no `conf/layer.conf`.
    #[display("layer configuration not found: {}", _0.display())]
    MissingLayerConf(#[error(not(source))] PathBuf),
    /// The parser toolkit checkout has no base configuration.
    #[display("toolkit configuration not found: {}", _0.display())]
    MissingToolkit(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The metadata is either readable or it isn't; only I/O may be transient.
        matches!(self, Self::Read(_))
    }
}

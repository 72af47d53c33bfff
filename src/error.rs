//! Command-line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("unable to load configuration")]
    Config,
    #[display("unable to open the index database")]
    Database,
    #[display("git is required but could not be found")]
    Git,
    /// An administrative change was rejected by the index.
    #[display("{_0}")]
    Rejected(#[error(not(source))] String),
    #[display("update failed")]
    Update,
}

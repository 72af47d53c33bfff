//! Thin async wrapper around the `git` command line.
//!
//! Only what layer synchronisation needs: clone, fetch, checkout, revision
//! lookup and name-status diffs.

mod diff;
pub mod error;
mod git;

pub use crate::diff::{Change, ChangeKind, ChangeSet};
pub use crate::git::{Git, Repository, fetch_dir_name};

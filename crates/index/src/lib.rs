//! SQLite storage for the layer index.
//!
//! The index records, per layer and branch, which recipes, machines, classes
//! and appends exist in the layer's repository, together with the revision
//! they were last synchronised from. The repositories are the source of
//! truth; the index is what queries and bookmarks refer to, which is why
//! recipe ids must survive renames.
//!
//! # Architecture
//! - [`Database`]: connection pool and embedded migrations.
//! - [`Catalog`]: reads against committed state and administrative inserts.
//! - [`Snapshot`]: a single transaction through which a layer update makes
//!   all of its changes, committed or rolled back as one unit.

mod catalog;
mod db;
pub mod error;
pub mod models;
mod reads;
mod snapshot;

pub use crate::catalog::Catalog;
pub use crate::db::Database;
pub use crate::snapshot::Snapshot;

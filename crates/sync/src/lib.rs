//! Incremental synchronisation of layer repositories into the layer index.
//!
//! An [`Updater`] run fetches every selected repository, then updates each
//! layer branch inside its own transaction: new revisions are diffed against
//! the last synchronised one and only the affected recipes, machines, classes
//! and appends are touched.

mod changes;
mod classify;
mod depends;
pub mod error;
mod fetch;
mod lock;
mod reconcile;
mod transaction;
mod update;
mod vercmp;

#[cfg(test)]
mod testutil;

pub use crate::changes::{Bucket, LayerChanges, classify_changes};
pub use crate::classify::{Classified, NestedLayers, classify, scan_layer};
pub use crate::depends::{DependencyStats, VersionConstraint, explode_dep_versions};
pub use crate::fetch::{FetchReport, Fetcher};
pub use crate::lock::RunLock;
pub use crate::reconcile::{LayerScope, ReconcileStats, Reconciler};
pub use crate::transaction::{Coordinator, LayerOutcome, TransactionOutcome};
pub use crate::update::{RunSummary, UpdateOptions, Updater};
pub use crate::vercmp::{CompareOp, vercmp};

//! Transaction Coordinator.
//!
//! Each layer branch is updated inside its own transaction. Whatever happens
//! inside, the parser context is reset afterwards so that no cached state
//! leaks into the next layer.

use crate::error::{Error, ErrorKind};
use crate::reconcile::ReconcileStats;
use derive_more::Display;
use layersync_extract::ParserContext;
use layersync_index::{Database, Snapshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What the body of a layer transaction decided.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum LayerOutcome {
    #[display("updated")]
    Updated(ReconcileStats),
    /// Nothing to reconcile; bookkeeping only.
    #[display("up to date")]
    UpToDate,
    /// Nothing may be written for this layer.
    #[display("skipped: {_0}")]
    Skipped(String),
}
impl LayerOutcome {
    pub fn is_committable(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

#[derive(Debug)]
pub enum TransactionOutcome {
    Committed(LayerOutcome),
    RolledBack(LayerOutcome),
    Failed(Error),
    Interrupted,
}
impl TransactionOutcome {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

pub struct Coordinator {
    db: Database,
    ctx: ParserContext,
    cancel: CancellationToken,
    dry_run: bool,
}

impl Coordinator {
    pub fn new(db: Database, ctx: ParserContext, cancel: CancellationToken, dry_run: bool) -> Self {
        Self { db, ctx, cancel, dry_run }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `body` inside a fresh transaction.
    ///
    /// The transaction is committed only if `body` returns a committable
    /// outcome and this is not a dry run. Errors, skips, dry runs and
    /// cancellation all roll back.
    #[instrument(skip(self, body))]
    pub async fn with_layer_transaction<F>(&mut self, layer: &str, body: F) -> TransactionOutcome
    where
        F: AsyncFnOnce(&mut Snapshot, &mut ParserContext) -> crate::error::Result<LayerOutcome>,
    {
        if self.cancel.is_cancelled() {
            return TransactionOutcome::Interrupted;
        }
        let outcome = self.run(layer, body).await;
        self.ctx.reset();
        outcome
    }

    async fn run<F>(&mut self, layer: &str, body: F) -> TransactionOutcome
    where
        F: AsyncFnOnce(&mut Snapshot, &mut ParserContext) -> crate::error::Result<LayerOutcome>,
    {
        let mut snapshot = match self.db.begin().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(layer, error = ?err, "unable to start transaction");
                return TransactionOutcome::Failed(err.raise(ErrorKind::Storage));
            },
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = body(&mut snapshot, &mut self.ctx) => Some(result),
        };

        match result {
            None => {
                warn!(layer, "interrupted, rolling back");
                rollback(snapshot, layer).await;
                TransactionOutcome::Interrupted
            },
            Some(Err(err)) => {
                error!(layer, error = ?err, "layer update failed, rolling back");
                rollback(snapshot, layer).await;
                TransactionOutcome::Failed(err)
            },
            Some(Ok(outcome)) if outcome.is_committable() && !self.dry_run => match snapshot.commit().await {
                Ok(()) => {
                    debug!(layer, %outcome, "committed");
                    TransactionOutcome::Committed(outcome)
                },
                Err(err) => {
                    error!(layer, error = ?err, "unable to commit");
                    TransactionOutcome::Failed(err.raise(ErrorKind::Storage))
                },
            },
            Some(Ok(outcome)) => {
                if self.dry_run {
                    info!(layer, %outcome, "dry run, rolling back");
                } else {
                    debug!(layer, %outcome, "rolling back");
                }
                rollback(snapshot, layer).await;
                TransactionOutcome::RolledBack(outcome)
            },
        }
    }
}

async fn rollback(snapshot: Snapshot, layer: &str) {
    if let Err(err) = snapshot.rollback().await {
        warn!(layer, error = ?err, "rollback failed");
    }
}

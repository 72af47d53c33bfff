//! Pool-level reads and administrative writes.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    BBAppend, BBClass, Branch, LayerBranch, LayerBranchId, LayerDependency, LayerId, LayerItem, LayerItemRow,
    LayerMaintainer, Machine, NewBranch, NewLayer, NewMaintainer, Recipe, RecipeId, BranchId,
};
use crate::reads;
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::{instrument, warn};

/// Read access to the committed index, plus the inserts used to register
/// branches, layers and maintainers outside of a layer update.
///
/// Never call into a `Catalog` while a [`Snapshot`](crate::Snapshot) on the
/// same single-connection database is open.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}
impl From<&Database> for Catalog {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Branches and layers
    // =========================================================================

    pub async fn branch(&self, name: &str) -> Result<Option<Branch>> {
        reads::branch(&self.pool, name).await
    }

    #[instrument(skip(self), fields(name = %branch.name))]
    pub async fn create_branch(&self, branch: &NewBranch) -> Result<Branch> {
        sqlx::query_as(include_str!("../queries/insert_branch.sql"))
            .bind(&branch.name)
            .bind(&branch.bitbake_branch)
            .bind(&branch.short_description)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Constraint("branch name must be unique"))
    }

    pub async fn layer(&self, name: &str) -> Result<Option<LayerItem>> {
        reads::layer(&self.pool, name).await
    }

    #[instrument(skip(self), fields(name = %layer.name))]
    pub async fn create_layer(&self, layer: &NewLayer) -> Result<LayerItem> {
        let row: LayerItemRow = sqlx::query_as(include_str!("../queries/insert_layer.sql"))
            .bind(&layer.name)
            .bind(layer.status.to_string())
            .bind(&layer.layer_type)
            .bind(&layer.summary)
            .bind(&layer.description)
            .bind(&layer.vcs_url)
            .bind(&layer.vcs_web_url)
            .bind(layer.classic)
            .bind(layer.index_preference)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Constraint("layer name must be unique"))?;
        LayerItem::try_from(row)
    }

    /// Layers to synchronise, ordered by name.
    ///
    /// With no names, every published non-classic layer. Otherwise the named
    /// layers regardless of status; classic and unknown names are skipped
    /// with a warning.
    pub async fn layers_for_update(&self, names: &[String]) -> Result<Vec<LayerItem>> {
        if names.is_empty() {
            return reads::published_layers(&self.pool).await;
        }
        let mut layers = Vec::with_capacity(names.len());
        for name in names {
            match reads::layer(&self.pool, name).await? {
                Some(layer) if layer.classic => warn!(layer = %name, "skipping classic layer"),
                Some(layer) => layers.push(layer),
                None => warn!(layer = %name, "no such layer"),
            }
        }
        layers.sort_by(|a, b| a.name.cmp(&b.name));
        layers.dedup_by_key(|layer| layer.id);
        Ok(layers)
    }

    pub async fn layer_branch(&self, layer: LayerId, branch: BranchId) -> Result<Option<LayerBranch>> {
        reads::layer_branch(&self.pool, layer, branch).await
    }

    /// Create the layer branch if needed and return it, for administrative
    /// setup (pinning a subdirectory or tracked branch before the first sync).
    pub async fn ensure_layer_branch(&self, layer: LayerId, branch: BranchId) -> Result<LayerBranch> {
        if let Some(existing) = reads::layer_branch(&self.pool, layer, branch).await? {
            return Ok(existing);
        }
        let mut snapshot = crate::Snapshot::new(self.pool.begin().await.or_raise(|| ErrorKind::Database)?);
        let created = snapshot.create_layer_branch(layer, branch).await?;
        snapshot.commit().await?;
        Ok(created)
    }

    /// Persist administrative edits to a layer branch.
    pub async fn save_layer_branch(&self, layerbranch: &LayerBranch) -> Result<()> {
        let mut snapshot = crate::Snapshot::new(self.pool.begin().await.or_raise(|| ErrorKind::Database)?);
        snapshot.save_layer_branch(layerbranch).await?;
        snapshot.commit().await
    }

    // =========================================================================
    // Layer branch contents
    // =========================================================================

    pub async fn recipes(&self, layerbranch: LayerBranchId) -> Result<Vec<Recipe>> {
        reads::recipes(&self.pool, layerbranch).await
    }

    /// Repository-relative paths recorded as inputs of a recipe.
    pub async fn file_dependencies(&self, recipe: RecipeId) -> Result<Vec<String>> {
        reads::file_dependencies(&self.pool, recipe).await
    }

    pub async fn machines(&self, layerbranch: LayerBranchId) -> Result<Vec<Machine>> {
        reads::machines(&self.pool, layerbranch).await
    }

    pub async fn classes(&self, layerbranch: LayerBranchId) -> Result<Vec<BBClass>> {
        reads::classes(&self.pool, layerbranch).await
    }

    pub async fn appends(&self, layerbranch: LayerBranchId) -> Result<Vec<BBAppend>> {
        reads::appends(&self.pool, layerbranch).await
    }

    pub async fn dependencies(&self, layerbranch: LayerBranchId) -> Result<Vec<LayerDependency>> {
        reads::dependencies(&self.pool, layerbranch).await
    }

    pub async fn maintainers(&self, layerbranch: LayerBranchId) -> Result<Vec<LayerMaintainer>> {
        reads::maintainers(&self.pool, layerbranch).await
    }

    pub async fn add_maintainer(&self, layerbranch: LayerBranchId, maintainer: &NewMaintainer) -> Result<LayerMaintainer> {
        sqlx::query_as(include_str!("../queries/insert_maintainer.sql"))
            .bind(layerbranch)
            .bind(&maintainer.name)
            .bind(&maintainer.email)
            .bind(&maintainer.responsibility)
            .bind(if maintainer.active { "A" } else { "I" })
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }
}

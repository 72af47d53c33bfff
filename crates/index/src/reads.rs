//! Read queries shared by [`Catalog`](crate::Catalog) (pool) and
//! [`Snapshot`](crate::Snapshot) (open transaction).

use crate::error::{ErrorKind, Result};
use crate::models::{
    BBAppend, BBAppendRow, BBClass, BBClassRow, Branch, LayerBranch, LayerBranchId, LayerBranchRow, LayerDependency,
    LayerId, LayerItem, LayerItemRow, LayerMaintainer, Machine, MachineRow, Recipe, RecipeId, RecipeLocation,
    RecipeRow, BranchId,
};
use exn::ResultExt;
use sqlx::SqliteExecutor;

fn convert<R, M>(rows: Vec<R>) -> Result<Vec<M>>
where
    M: TryFrom<R, Error = crate::error::Error>,
{
    rows.into_iter().map(M::try_from).collect()
}

pub(crate) async fn branch<'e>(exec: impl SqliteExecutor<'e>, name: &str) -> Result<Option<Branch>> {
    sqlx::query_as(include_str!("../queries/get_branch.sql"))
        .bind(name)
        .fetch_optional(exec)
        .await
        .or_raise(|| ErrorKind::Database)
}

pub(crate) async fn layer<'e>(exec: impl SqliteExecutor<'e>, name: &str) -> Result<Option<LayerItem>> {
    let row: Option<LayerItemRow> = sqlx::query_as(include_str!("../queries/get_layer.sql"))
        .bind(name)
        .fetch_optional(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(LayerItem::try_from).transpose()
}

pub(crate) async fn published_layers<'e>(exec: impl SqliteExecutor<'e>) -> Result<Vec<LayerItem>> {
    let rows: Vec<LayerItemRow> = sqlx::query_as(include_str!("../queries/list_published_layers.sql"))
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    convert(rows)
}

pub(crate) async fn layer_branch<'e>(
    exec: impl SqliteExecutor<'e>,
    layer: LayerId,
    branch: BranchId,
) -> Result<Option<LayerBranch>> {
    let row: Option<LayerBranchRow> = sqlx::query_as(include_str!("../queries/get_layer_branch.sql"))
        .bind(layer)
        .bind(branch)
        .fetch_optional(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(LayerBranch::try_from).transpose()
}

/// Every branch of a layer, those on `preferred` branch name first.
pub(crate) async fn layer_branches<'e>(
    exec: impl SqliteExecutor<'e>,
    layer: LayerId,
    preferred: &str,
) -> Result<Vec<LayerBranch>> {
    let rows: Vec<LayerBranchRow> = sqlx::query_as(include_str!("../queries/list_layer_branches.sql"))
        .bind(layer)
        .bind(preferred)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    convert(rows)
}

pub(crate) async fn recipes<'e>(exec: impl SqliteExecutor<'e>, layerbranch: LayerBranchId) -> Result<Vec<Recipe>> {
    let rows: Vec<RecipeRow> = sqlx::query_as(include_str!("../queries/list_recipes.sql"))
        .bind(layerbranch)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    convert(rows)
}

pub(crate) async fn recipe_by_location<'e>(
    exec: impl SqliteExecutor<'e>,
    layerbranch: LayerBranchId,
    location: &RecipeLocation,
) -> Result<Option<Recipe>> {
    let row: Option<RecipeRow> = sqlx::query_as(include_str!("../queries/get_recipe_by_location.sql"))
        .bind(layerbranch)
        .bind(&location.filepath)
        .bind(&location.filename)
        .fetch_optional(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(Recipe::try_from).transpose()
}

pub(crate) async fn file_dependencies<'e>(exec: impl SqliteExecutor<'e>, recipe: RecipeId) -> Result<Vec<String>> {
    sqlx::query_scalar(include_str!("../queries/list_file_dependencies.sql"))
        .bind(recipe)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)
}

pub(crate) async fn machines<'e>(exec: impl SqliteExecutor<'e>, layerbranch: LayerBranchId) -> Result<Vec<Machine>> {
    let rows: Vec<MachineRow> = sqlx::query_as(include_str!("../queries/list_machines.sql"))
        .bind(layerbranch)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    convert(rows)
}

pub(crate) async fn classes<'e>(exec: impl SqliteExecutor<'e>, layerbranch: LayerBranchId) -> Result<Vec<BBClass>> {
    let rows: Vec<BBClassRow> = sqlx::query_as(include_str!("../queries/list_classes.sql"))
        .bind(layerbranch)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    convert(rows)
}

pub(crate) async fn appends<'e>(exec: impl SqliteExecutor<'e>, layerbranch: LayerBranchId) -> Result<Vec<BBAppend>> {
    let rows: Vec<BBAppendRow> = sqlx::query_as(include_str!("../queries/list_appends.sql"))
        .bind(layerbranch)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)?;
    convert(rows)
}

pub(crate) async fn dependencies<'e>(
    exec: impl SqliteExecutor<'e>,
    layerbranch: LayerBranchId,
) -> Result<Vec<LayerDependency>> {
    sqlx::query_as(include_str!("../queries/list_dependencies.sql"))
        .bind(layerbranch)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)
}

pub(crate) async fn maintainers<'e>(
    exec: impl SqliteExecutor<'e>,
    layerbranch: LayerBranchId,
) -> Result<Vec<LayerMaintainer>> {
    sqlx::query_as(include_str!("../queries/list_maintainers.sql"))
        .bind(layerbranch)
        .fetch_all(exec)
        .await
        .or_raise(|| ErrorKind::Database)
}

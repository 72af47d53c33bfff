//! Transactional view of the index used while updating one layer branch.

use crate::error::{ErrorKind, Result};
use crate::models::{
    self, BBAppend, BBClass, BranchId, DependencyCandidate, FieldColumns, LayerBranch, LayerBranchId,
    LayerBranchRow, LayerDependency, LayerId, LayerMaintainer, Machine, Recipe, RecipeId, RecipeLocation, RecipeRow,
};
use crate::reads;
use exn::ResultExt;
use layersync_extract::models::RecipeFields;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, instrument};

/// One open transaction against the index.
///
/// Every write a layer update makes goes through a `Snapshot`. Nothing is
/// visible to other connections until [`Snapshot::commit`]; dropping the
/// snapshot without committing rolls everything back.
pub struct Snapshot {
    tx: Transaction<'static, Sqlite>,
}

impl Snapshot {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.or_raise(|| ErrorKind::Database)
    }

    // =========================================================================
    // Layer branches
    // =========================================================================

    pub async fn layer_branch(&mut self, layer: LayerId, branch: BranchId) -> Result<Option<LayerBranch>> {
        reads::layer_branch(&mut *self.tx, layer, branch).await
    }

    /// Every existing branch of a layer, those on the `preferred` branch first.
    pub async fn layer_branches(&mut self, layer: LayerId, preferred: &str) -> Result<Vec<LayerBranch>> {
        reads::layer_branches(&mut *self.tx, layer, preferred).await
    }

    pub async fn create_layer_branch(&mut self, layer: LayerId, branch: BranchId) -> Result<LayerBranch> {
        let row: LayerBranchRow = sqlx::query_as(include_str!("../queries/insert_layer_branch.sql"))
            .bind(layer)
            .bind(branch)
            .fetch_one(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Constraint("one layer branch per layer and branch"))?;
        LayerBranch::try_from(row)
    }

    /// Copy the subdirectory, maintainers and dependency edges of `source`
    /// into a freshly created layer branch, then save it.
    #[instrument(skip_all, fields(layerbranch = %target.id, seed = %source.id))]
    pub async fn seed_layer_branch(&mut self, target: &mut LayerBranch, source: &LayerBranch) -> Result<()> {
        target.vcs_subdir.clone_from(&source.vcs_subdir);
        self.save_layer_branch(target).await?;
        for query in [include_str!("../queries/copy_maintainers.sql"), include_str!("../queries/copy_dependencies.sql")] {
            sqlx::query(query)
                .bind(target.id)
                .bind(source.id)
                .execute(&mut *self.tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        debug!("seeded layer branch");
        Ok(())
    }

    pub async fn save_layer_branch(&mut self, layerbranch: &LayerBranch) -> Result<()> {
        sqlx::query(include_str!("../queries/update_layer_branch.sql"))
            .bind(&layerbranch.collection)
            .bind(&layerbranch.version)
            .bind(&layerbranch.vcs_subdir)
            .bind(&layerbranch.actual_branch)
            .bind(&layerbranch.vcs_last_rev)
            .bind(layerbranch.vcs_last_commit.map(|t| t.unix_timestamp()))
            .bind(layerbranch.vcs_last_fetch.map(|t| t.unix_timestamp()))
            .bind(layerbranch.id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn maintainers(&mut self, layerbranch: LayerBranchId) -> Result<Vec<LayerMaintainer>> {
        reads::maintainers(&mut *self.tx, layerbranch).await
    }

    // =========================================================================
    // Recipes
    // =========================================================================

    pub async fn recipes(&mut self, layerbranch: LayerBranchId) -> Result<Vec<Recipe>> {
        reads::recipes(&mut *self.tx, layerbranch).await
    }

    pub async fn recipe_by_location(
        &mut self,
        layerbranch: LayerBranchId,
        location: &RecipeLocation,
    ) -> Result<Option<Recipe>> {
        reads::recipe_by_location(&mut *self.tx, layerbranch, location).await
    }

    pub async fn create_recipe(
        &mut self,
        layerbranch: LayerBranchId,
        location: &RecipeLocation,
        fields: &RecipeFields,
    ) -> Result<RecipeId> {
        let columns = FieldColumns::from(fields);
        sqlx::query_scalar(include_str!("../queries/insert_recipe.sql"))
            .bind(layerbranch)
            .bind(&location.filepath)
            .bind(&location.filename)
            .bind(&columns.fields.pn)
            .bind(&columns.fields.pv)
            .bind(&columns.fields.summary)
            .bind(&columns.fields.description)
            .bind(&columns.fields.section)
            .bind(&columns.fields.license)
            .bind(&columns.fields.homepage)
            .bind(&columns.fields.bugtracker)
            .bind(&columns.provides)
            .bind(&columns.bbclassextend)
            .bind(&columns.inherits)
            .bind(models::now())
            .fetch_one(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Rewrite the extracted fields of a recipe that stayed in place.
    pub async fn update_recipe(&mut self, id: RecipeId, fields: &RecipeFields) -> Result<()> {
        let columns = FieldColumns::from(fields);
        sqlx::query(include_str!("../queries/update_recipe.sql"))
            .bind(&columns.fields.pn)
            .bind(&columns.fields.pv)
            .bind(&columns.fields.summary)
            .bind(&columns.fields.description)
            .bind(&columns.fields.section)
            .bind(&columns.fields.license)
            .bind(&columns.fields.homepage)
            .bind(&columns.fields.bugtracker)
            .bind(&columns.provides)
            .bind(&columns.bbclassextend)
            .bind(&columns.inherits)
            .bind(models::now())
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Move an existing recipe row to a new file and rewrite its fields,
    /// keeping its id.
    ///
    /// Used when a recipe file was deleted and another one with the same `pn`
    /// was added in the same update (typically a version bump that renamed
    /// the file), so external references to the recipe stay valid.
    pub async fn reclaim_recipe(&mut self, id: RecipeId, location: &RecipeLocation, fields: &RecipeFields) -> Result<()> {
        let columns = FieldColumns::from(fields);
        let result = sqlx::query(include_str!("../queries/reclaim_recipe.sql"))
            .bind(&location.filepath)
            .bind(&location.filename)
            .bind(&columns.fields.pn)
            .bind(&columns.fields.pv)
            .bind(&columns.fields.summary)
            .bind(&columns.fields.description)
            .bind(&columns.fields.section)
            .bind(&columns.fields.license)
            .bind(&columns.fields.homepage)
            .bind(&columns.fields.bugtracker)
            .bind(&columns.provides)
            .bind(&columns.bbclassextend)
            .bind(&columns.inherits)
            .bind(models::now())
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::Constraint("reclaimed recipe must exist"));
        }
        Ok(())
    }

    /// Returns `false` if no such recipe existed.
    pub async fn delete_recipe(&mut self, id: RecipeId) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_recipe.sql"))
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every recipe of a layer branch, returning how many there were.
    pub async fn delete_recipes(&mut self, layerbranch: LayerBranchId) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_recipes.sql"))
            .bind(layerbranch)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    /// Replace the recorded input files of a recipe.
    pub async fn replace_file_dependencies(
        &mut self,
        recipe: RecipeId,
        layerbranch: LayerBranchId,
        paths: &[String],
    ) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_file_dependencies.sql"))
            .bind(recipe)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for path in paths {
            sqlx::query(include_str!("../queries/insert_file_dependency.sql"))
                .bind(recipe)
                .bind(layerbranch)
                .bind(path)
                .execute(&mut *self.tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(())
    }

    pub async fn file_dependencies(&mut self, recipe: RecipeId) -> Result<Vec<String>> {
        reads::file_dependencies(&mut *self.tx, recipe).await
    }

    /// Recipes whose last evaluation read the given repository-relative path.
    pub async fn recipes_depending_on(&mut self, layerbranch: LayerBranchId, path: &str) -> Result<Vec<Recipe>> {
        let rows: Vec<RecipeRow> = sqlx::query_as(include_str!("../queries/list_recipes_depending_on.sql"))
            .bind(layerbranch)
            .bind(path)
            .fetch_all(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Recipe::try_from).collect()
    }

    // =========================================================================
    // Machines, classes and appends
    // =========================================================================

    pub async fn machines(&mut self, layerbranch: LayerBranchId) -> Result<Vec<Machine>> {
        reads::machines(&mut *self.tx, layerbranch).await
    }

    pub async fn create_machine(&mut self, layerbranch: LayerBranchId, name: &str, description: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_machine.sql"))
            .bind(layerbranch)
            .bind(name)
            .bind(description)
            .bind(models::now())
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Returns `false` if the machine is not recorded.
    pub async fn update_machine(&mut self, layerbranch: LayerBranchId, name: &str, description: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/update_machine.sql"))
            .bind(description)
            .bind(models::now())
            .bind(layerbranch)
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_machine(&mut self, layerbranch: LayerBranchId, name: &str) -> Result<bool> {
        self.delete_named(include_str!("../queries/delete_machine.sql"), layerbranch, name).await
    }

    pub async fn clear_machines(&mut self, layerbranch: LayerBranchId) -> Result<u64> {
        self.clear(include_str!("../queries/delete_machines.sql"), layerbranch).await
    }

    pub async fn classes(&mut self, layerbranch: LayerBranchId) -> Result<Vec<BBClass>> {
        reads::classes(&mut *self.tx, layerbranch).await
    }

    pub async fn create_class(&mut self, layerbranch: LayerBranchId, name: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_class.sql"))
            .bind(layerbranch)
            .bind(name)
            .bind(models::now())
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn delete_class(&mut self, layerbranch: LayerBranchId, name: &str) -> Result<bool> {
        self.delete_named(include_str!("../queries/delete_class.sql"), layerbranch, name).await
    }

    pub async fn clear_classes(&mut self, layerbranch: LayerBranchId) -> Result<u64> {
        self.clear(include_str!("../queries/delete_classes.sql"), layerbranch).await
    }

    pub async fn appends(&mut self, layerbranch: LayerBranchId) -> Result<Vec<BBAppend>> {
        reads::appends(&mut *self.tx, layerbranch).await
    }

    pub async fn create_append(&mut self, layerbranch: LayerBranchId, location: &RecipeLocation) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_append.sql"))
            .bind(layerbranch)
            .bind(&location.filepath)
            .bind(&location.filename)
            .bind(models::now())
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn delete_append(&mut self, layerbranch: LayerBranchId, location: &RecipeLocation) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_append.sql"))
            .bind(layerbranch)
            .bind(&location.filepath)
            .bind(&location.filename)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_appends(&mut self, layerbranch: LayerBranchId) -> Result<u64> {
        self.clear(include_str!("../queries/delete_appends.sql"), layerbranch).await
    }

    async fn delete_named(&mut self, query: &'static str, layerbranch: LayerBranchId, name: &str) -> Result<bool> {
        let result = sqlx::query(query)
            .bind(layerbranch)
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&mut self, query: &'static str, layerbranch: LayerBranchId) -> Result<u64> {
        let result = sqlx::query(query)
            .bind(layerbranch)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Layer dependencies
    // =========================================================================

    pub async fn dependencies(&mut self, layerbranch: LayerBranchId) -> Result<Vec<LayerDependency>> {
        reads::dependencies(&mut *self.tx, layerbranch).await
    }

    /// Layer branches on `branch` that could satisfy a dependency on `name`:
    /// those whose layer is called `name`, followed by those declaring it as
    /// their collection.
    pub async fn dependency_candidates(&mut self, branch: BranchId, name: &str) -> Result<Vec<DependencyCandidate>> {
        let mut candidates: Vec<DependencyCandidate> = Vec::new();
        for query in [
            include_str!("../queries/candidates_by_layer_name.sql"),
            include_str!("../queries/candidates_by_collection.sql"),
        ] {
            let found: Vec<DependencyCandidate> = sqlx::query_as(query)
                .bind(branch)
                .bind(name)
                .fetch_all(&mut *self.tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            for candidate in found {
                if !candidates.iter().any(|c| c.layerbranch_id == candidate.layerbranch_id) {
                    candidates.push(candidate);
                }
            }
        }
        Ok(candidates)
    }

    pub async fn has_dependency(&mut self, layerbranch: LayerBranchId, dependency: LayerId) -> Result<bool> {
        sqlx::query_scalar(include_str!("../queries/has_dependency.sql"))
            .bind(layerbranch)
            .bind(dependency)
            .fetch_one(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn add_dependency(&mut self, layerbranch: LayerBranchId, dependency: LayerId, required: bool) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_dependency.sql"))
            .bind(layerbranch)
            .bind(dependency)
            .bind(required)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Constraint("one dependency edge per layer"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewBranch, NewLayer, NewMaintainer};
    use crate::Database;

    async fn fixture() -> (Database, LayerBranch) {
        let db = Database::connect_in_memory().await.unwrap();
        let catalog = db.catalog();
        let branch = catalog.create_branch(&NewBranch::new("master")).await.unwrap();
        let layer = catalog.create_layer(&NewLayer::new("meta-foo", "https://example.com/foo.git")).await.unwrap();
        let layerbranch = catalog.ensure_layer_branch(layer.id, branch.id).await.unwrap();
        (db, layerbranch)
    }

    fn fields(pn: &str, pv: &str) -> RecipeFields {
        RecipeFields { pn: pn.to_string(), pv: pv.to_string(), ..RecipeFields::default() }
    }

    #[tokio::test]
    async fn test_reclaim_keeps_recipe_id() {
        let (db, lb) = fixture().await;
        let mut snapshot = db.begin().await.unwrap();
        let old = RecipeLocation::new("recipes-core/foo", "foo_1.0.bb");
        let id = snapshot.create_recipe(lb.id, &old, &fields("foo", "1.0")).await.unwrap();
        let new = RecipeLocation::new("recipes-core/foo", "foo_1.1.bb");
        snapshot.reclaim_recipe(id, &new, &fields("foo", "1.1")).await.unwrap();
        snapshot.commit().await.unwrap();

        let recipes = db.catalog().recipes(lb.id).await.unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].id, id);
        assert_eq!(recipes[0].location, new);
        assert_eq!(recipes[0].fields.pv, "1.1");
    }

    #[tokio::test]
    async fn test_deleted_ids_are_not_reused() {
        let (db, lb) = fixture().await;
        let mut snapshot = db.begin().await.unwrap();
        let location = RecipeLocation::new("recipes-core/foo", "foo_1.0.bb");
        let first = snapshot.create_recipe(lb.id, &location, &fields("foo", "1.0")).await.unwrap();
        snapshot.create_machine(lb.id, "board", "Board").await.unwrap();
        let machine = snapshot.machines(lb.id).await.unwrap()[0].id;
        assert_eq!(snapshot.delete_recipes(lb.id).await.unwrap(), 1);
        snapshot.clear_machines(lb.id).await.unwrap();

        let second = snapshot.create_recipe(lb.id, &location, &fields("foo", "1.0")).await.unwrap();
        snapshot.create_machine(lb.id, "board", "Board").await.unwrap();
        assert_ne!(first, second);
        assert_ne!(snapshot.machines(lb.id).await.unwrap()[0].id, machine);
    }

    #[tokio::test]
    async fn test_reclaim_missing_recipe_fails() {
        let (db, _) = fixture().await;
        let mut snapshot = db.begin().await.unwrap();
        let err = snapshot
            .reclaim_recipe(RecipeId(999), &RecipeLocation::new("", "x.bb"), &fields("x", "1.0"))
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Constraint(_)));
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let (db, lb) = fixture().await;
        {
            let mut snapshot = db.begin().await.unwrap();
            snapshot.create_class(lb.id, "foo").await.unwrap();
            assert_eq!(snapshot.classes(lb.id).await.unwrap().len(), 1);
        }
        assert!(db.catalog().classes(lb.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_dependencies_follow_recipe() {
        let (db, lb) = fixture().await;
        let mut snapshot = db.begin().await.unwrap();
        let id = snapshot
            .create_recipe(lb.id, &RecipeLocation::new("recipes", "foo_1.0.bb"), &fields("foo", "1.0"))
            .await
            .unwrap();
        let paths = vec!["recipes/foo.inc".to_string(), "classes/bar.bbclass".to_string()];
        snapshot.replace_file_dependencies(id, lb.id, &paths).await.unwrap();
        let dependants = snapshot.recipes_depending_on(lb.id, "recipes/foo.inc").await.unwrap();
        assert_eq!(dependants.iter().map(|r| r.id).collect::<Vec<_>>(), vec![id]);
        assert!(snapshot.recipes_depending_on(lb.id, "recipes/other.inc").await.unwrap().is_empty());

        assert!(snapshot.delete_recipe(id).await.unwrap());
        assert!(snapshot.recipes_depending_on(lb.id, "recipes/foo.inc").await.unwrap().is_empty());
        assert!(!snapshot.delete_recipe(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_machines_update_in_place() {
        let (db, lb) = fixture().await;
        let mut snapshot = db.begin().await.unwrap();
        snapshot.create_machine(lb.id, "board", "Old").await.unwrap();
        assert!(snapshot.update_machine(lb.id, "board", "New").await.unwrap());
        assert!(!snapshot.update_machine(lb.id, "other", "New").await.unwrap());
        let machines = snapshot.machines(lb.id).await.unwrap();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].description, "New");
        assert_eq!(snapshot.clear_machines(lb.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seed_copies_maintainers_and_dependencies() {
        let db = Database::connect_in_memory().await.unwrap();
        let catalog = db.catalog();
        let master = catalog.create_branch(&NewBranch::new("master")).await.unwrap();
        let next = catalog.create_branch(&NewBranch::new("next")).await.unwrap();
        let layer = catalog.create_layer(&NewLayer::new("meta-foo", "https://example.com/foo.git")).await.unwrap();
        let core = catalog.create_layer(&NewLayer::new("openembedded-core", "https://example.com/oe.git")).await.unwrap();
        let mut source = catalog.ensure_layer_branch(layer.id, master.id).await.unwrap();
        source.vcs_subdir = "meta-foo".to_string();
        catalog.save_layer_branch(&source).await.unwrap();
        let maintainer = NewMaintainer { name: "Jo".to_string(), active: true, ..NewMaintainer::default() };
        catalog.add_maintainer(source.id, &maintainer).await.unwrap();

        let mut snapshot = db.begin().await.unwrap();
        snapshot.add_dependency(source.id, core.id, true).await.unwrap();
        let mut target = snapshot.create_layer_branch(layer.id, next.id).await.unwrap();
        let existing = snapshot.layer_branches(layer.id, "master").await.unwrap();
        assert_eq!(existing[0].id, source.id);
        snapshot.seed_layer_branch(&mut target, &existing[0]).await.unwrap();
        assert_eq!(target.vcs_subdir, "meta-foo");
        assert_eq!(snapshot.maintainers(target.id).await.unwrap()[0].name, "Jo");
        assert!(snapshot.has_dependency(target.id, core.id).await.unwrap());
        snapshot.commit().await.unwrap();

        let saved = db.catalog().layer_branch(layer.id, next.id).await.unwrap().unwrap();
        assert_eq!(saved.vcs_subdir, "meta-foo");
    }

    #[tokio::test]
    async fn test_dependency_candidates_prefer_layer_name() {
        let (db, lb) = fixture().await;
        let catalog = db.catalog();
        let branch = catalog.branch("master").await.unwrap().unwrap();
        let core = catalog.create_layer(&NewLayer::new("openembedded-core", "https://example.com/oe.git")).await.unwrap();
        let mut core_lb = catalog.ensure_layer_branch(core.id, branch.id).await.unwrap();
        core_lb.collection = "core".to_string();
        core_lb.version = "15".to_string();
        catalog.save_layer_branch(&core_lb).await.unwrap();

        let mut snapshot = db.begin().await.unwrap();
        let by_collection = snapshot.dependency_candidates(branch.id, "core").await.unwrap();
        assert_eq!(by_collection.len(), 1);
        assert_eq!(by_collection[0].layer_name, "openembedded-core");
        assert_eq!(by_collection[0].version, "15");
        let by_name = snapshot.dependency_candidates(branch.id, "meta-foo").await.unwrap();
        assert_eq!(by_name[0].layerbranch_id, lb.id);
        assert!(snapshot.dependency_candidates(branch.id, "missing").await.unwrap().is_empty());
    }
}

//! Reconciliation Engine.
//!
//! Turns either a classified diff ([`Reconciler::apply_changes`]) or a walk of
//! the whole layer ([`Reconciler::rescan`]) into row changes inside one
//! [`Snapshot`].
//!
//! Recipe rows keep their id across renames: a deleted recipe is only a
//! *deletion candidate* until every addition of the same pass has had the
//! chance to reclaim it by matching `pn`. Machines, classes and appends carry
//! no such guarantee.

use crate::changes::LayerChanges;
use crate::classify::{Classified, NestedLayers, scan_layer};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use layersync_extract::models::{LAYER_CONF, LayerConf, RecipeFields, split_recipe_filename};
use layersync_extract::{Parser, ParserContext, machine_description};
use layersync_index::Snapshot;
use layersync_index::models::{LayerBranchId, Recipe, RecipeId, RecipeLocation};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument, warn};

/// Row changes made while reconciling one layer branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub recipes_added: usize,
    pub recipes_reclaimed: usize,
    pub recipes_updated: usize,
    pub recipes_deleted: usize,
    /// Recipes stored with filename-derived fields only.
    pub extraction_failures: usize,
    pub machines: usize,
    pub classes: usize,
    pub appends: usize,
}

/// Where the layer being reconciled lives.
#[derive(Debug, Clone, Copy)]
pub struct LayerScope<'a> {
    pub layerbranch: LayerBranchId,
    /// Repository root; file dependencies are stored relative to it.
    pub repodir: &'a Path,
    pub layerdir: &'a Path,
    pub conf: &'a LayerConf,
    pub nested: &'a NestedLayers,
}

#[derive(Debug)]
struct DeletionCandidate {
    id: RecipeId,
    location: RecipeLocation,
    pn: String,
}
impl From<&Recipe> for DeletionCandidate {
    fn from(recipe: &Recipe) -> Self {
        Self { id: recipe.id, location: recipe.location.clone(), pn: recipe.fields.pn.clone() }
    }
}

struct Extracted {
    fields: RecipeFields,
    /// `None` when extraction failed; the previously recorded inputs are kept.
    file_dependencies: Option<Vec<String>>,
}

pub struct Reconciler<'a, P: ?Sized> {
    snapshot: &'a mut Snapshot,
    parser: &'a P,
    ctx: &'a mut ParserContext,
    layer: LayerScope<'a>,
    stats: ReconcileStats,
}

impl<'a, P: Parser + ?Sized> Reconciler<'a, P> {
    pub fn new(snapshot: &'a mut Snapshot, parser: &'a P, ctx: &'a mut ParserContext, layer: LayerScope<'a>) -> Self {
        Self { snapshot, parser, ctx, layer, stats: ReconcileStats::default() }
    }

    /// Incremental path: apply the changes between two revisions.
    #[instrument(skip_all, fields(layerbranch = %self.layer.layerbranch))]
    pub async fn apply_changes(mut self, changes: LayerChanges) -> Result<ReconcileStats> {
        let layerbranch = self.layer.layerbranch;
        // Recipe paths handled directly by this pass; dirty propagation skips them.
        let mut touched: HashSet<RecipeLocation> = HashSet::new();
        let mut deletions = Vec::new();

        for location in changes.recipes.deleted {
            let existing = self.snapshot.recipe_by_location(layerbranch, &location).await.or_raise(|| ErrorKind::Storage)?;
            match existing {
                Some(recipe) => {
                    debug!(path = %location.path().display(), "marking recipe for deletion");
                    deletions.push(DeletionCandidate::from(&recipe));
                    touched.insert(location);
                },
                None => warn!(path = %location.path().display(), "deleted recipe could not be found"),
            }
        }
        for location in &changes.appends.deleted {
            if self.snapshot.delete_append(layerbranch, location).await.or_raise(|| ErrorKind::Storage)? {
                self.stats.appends += 1;
            }
        }
        for name in &changes.machines.deleted {
            if self.snapshot.delete_machine(layerbranch, name).await.or_raise(|| ErrorKind::Storage)? {
                self.stats.machines += 1;
            }
        }
        for name in &changes.classes.deleted {
            if self.snapshot.delete_class(layerbranch, name).await.or_raise(|| ErrorKind::Storage)? {
                self.stats.classes += 1;
            }
        }

        for location in &changes.appends.added {
            self.replace_append(location).await?;
        }
        for name in changes.machines.added.iter().chain(&changes.machines.modified) {
            self.write_machine(name).await?;
        }
        for name in &changes.classes.added {
            self.replace_class(name).await?;
        }
        touched.extend(changes.recipes.added.iter().cloned());

        for location in changes.recipes.modified {
            let existing = self.snapshot.recipe_by_location(layerbranch, &location).await.or_raise(|| ErrorKind::Storage)?;
            if let Some(recipe) = existing {
                debug!(path = %location.path().display(), "updating modified recipe");
                self.refresh_recipe(recipe.id, &location).await?;
            }
            touched.insert(location);
        }

        let mut dirty: BTreeMap<RecipeId, Recipe> = BTreeMap::new();
        for path in &changes.modified_paths {
            let dependents =
                self.snapshot.recipes_depending_on(layerbranch, path).await.or_raise(|| ErrorKind::Storage)?;
            for recipe in dependents {
                dirty.entry(recipe.id).or_insert(recipe);
            }
        }
        for recipe in dirty.into_values().filter(|recipe| !touched.contains(&recipe.location)) {
            debug!(path = %recipe.location.path().display(), "updating recipe with modified inputs");
            self.refresh_recipe(recipe.id, &recipe.location).await?;
        }

        self.apply_additions(changes.recipes.added, deletions).await?;
        Ok(self.stats)
    }

    /// Full-scan path: walk the whole layer.
    ///
    /// Existing recipe rows whose file is still present are refreshed in
    /// place, unless `full_reload` discards them all first. Machines, classes
    /// and appends are always rebuilt from the walk.
    #[instrument(skip_all, fields(layerbranch = %self.layer.layerbranch, full_reload = full_reload))]
    pub async fn rescan(mut self, full_reload: bool) -> Result<ReconcileStats> {
        let layerbranch = self.layer.layerbranch;
        let mut deletions = Vec::new();
        let mut known: HashSet<RecipeLocation> = HashSet::new();

        if full_reload {
            let deleted = self.snapshot.delete_recipes(layerbranch).await.or_raise(|| ErrorKind::Storage)?;
            self.stats.recipes_deleted += deleted as usize;
        } else {
            let existing = self.snapshot.recipes(layerbranch).await.or_raise(|| ErrorKind::Storage)?;
            for recipe in existing {
                let path = recipe.location.path();
                if self.layer.layerdir.join(&path).is_file() && !self.layer.nested.contains(&path) {
                    self.refresh_recipe(recipe.id, &recipe.location).await?;
                } else {
                    debug!(path = %path.display(), "marking recipe for deletion");
                    deletions.push(DeletionCandidate::from(&recipe));
                }
                known.insert(recipe.location);
            }
        }

        self.snapshot.clear_machines(layerbranch).await.or_raise(|| ErrorKind::Storage)?;
        self.snapshot.clear_classes(layerbranch).await.or_raise(|| ErrorKind::Storage)?;
        self.snapshot.clear_appends(layerbranch).await.or_raise(|| ErrorKind::Storage)?;

        let mut additions = Vec::new();
        for (_, classified) in scan_layer(self.layer.layerdir, self.layer.nested) {
            match classified {
                Classified::Recipe(location) => {
                    if !known.contains(&location) {
                        additions.push(location);
                    }
                },
                Classified::Append(location) => {
                    self.snapshot.create_append(layerbranch, &location).await.or_raise(|| ErrorKind::Storage)?;
                    self.stats.appends += 1;
                },
                Classified::Machine(name) => {
                    let description = self.machine_description(&name);
                    self.snapshot
                        .create_machine(layerbranch, &name, &description)
                        .await
                        .or_raise(|| ErrorKind::Storage)?;
                    self.stats.machines += 1;
                },
                Classified::Class(name) => {
                    self.snapshot.create_class(layerbranch, &name).await.or_raise(|| ErrorKind::Storage)?;
                    self.stats.classes += 1;
                },
            }
        }

        self.apply_additions(additions, deletions).await?;
        Ok(self.stats)
    }

    /// Create or reclaim a row for each added recipe, then delete the
    /// deletion candidates nobody reclaimed.
    async fn apply_additions(
        &mut self,
        mut additions: Vec<RecipeLocation>,
        mut deletions: Vec<DeletionCandidate>,
    ) -> Result<()> {
        let layerbranch = self.layer.layerbranch;
        additions.sort();
        additions.dedup();
        for location in additions {
            // The filename is good enough to match on; no need to parse first.
            let (pn, pv) = split_recipe_filename(&location.filename);
            let extracted = self.extract(&location);
            let id = match deletions.iter().position(|candidate| candidate.pn == pn) {
                Some(index) => {
                    let reclaimed = deletions.remove(index);
                    debug!(
                        from = %reclaimed.location.path().display(),
                        to = %location.path().display(),
                        pn = %pn,
                        pv = %pv,
                        "reclaiming recipe record"
                    );
                    self.snapshot
                        .reclaim_recipe(reclaimed.id, &location, &extracted.fields)
                        .await
                        .or_raise(|| ErrorKind::Storage)?;
                    self.stats.recipes_reclaimed += 1;
                    reclaimed.id
                },
                None => {
                    debug!(path = %location.path().display(), pn = %pn, pv = %pv, "adding recipe");
                    let id = self
                        .snapshot
                        .create_recipe(layerbranch, &location, &extracted.fields)
                        .await
                        .or_raise(|| ErrorKind::Storage)?;
                    self.stats.recipes_added += 1;
                    id
                },
            };
            self.record_file_dependencies(id, extracted.file_dependencies.as_deref()).await?;
        }
        for candidate in deletions {
            debug!(path = %candidate.location.path().display(), pn = %candidate.pn, "deleting recipe");
            if self.snapshot.delete_recipe(candidate.id).await.or_raise(|| ErrorKind::Storage)? {
                self.stats.recipes_deleted += 1;
            }
        }
        Ok(())
    }

    async fn refresh_recipe(&mut self, id: RecipeId, location: &RecipeLocation) -> Result<()> {
        let extracted = self.extract(location);
        self.snapshot.update_recipe(id, &extracted.fields).await.or_raise(|| ErrorKind::Storage)?;
        self.stats.recipes_updated += 1;
        self.record_file_dependencies(id, extracted.file_dependencies.as_deref()).await
    }

    async fn record_file_dependencies(&mut self, id: RecipeId, paths: Option<&[String]>) -> Result<()> {
        let Some(paths) = paths else { return Ok(()) };
        self.snapshot
            .replace_file_dependencies(id, self.layer.layerbranch, paths)
            .await
            .or_raise(|| ErrorKind::Storage)
    }

    /// Evaluate a recipe, falling back to filename-derived fields on failure
    /// so that the row still takes part in later reconciliation.
    fn extract(&mut self, location: &RecipeLocation) -> Extracted {
        let path = self.layer.layerdir.join(location.path());
        match self.parser.parse_recipe(self.ctx, self.layer.conf, &path) {
            Ok(extraction) => Extracted {
                file_dependencies: Some(self.layer_files(&extraction.depends_on)),
                fields: extraction.fields,
            },
            Err(err) => {
                error!(path = %path.display(), error = ?err, "unable to read recipe");
                self.stats.extraction_failures += 1;
                Extracted { fields: RecipeFields::from_filename(&location.filename), file_dependencies: None }
            },
        }
    }

    /// The inputs that live in this layer (other than its `conf/layer.conf`),
    /// relative to the repository root.
    fn layer_files(&self, depends_on: &[PathBuf]) -> Vec<String> {
        let layer_conf = self.layer.layerdir.join(LAYER_CONF);
        depends_on
            .iter()
            .filter(|path| path.starts_with(self.layer.layerdir) && **path != layer_conf)
            .filter_map(|path| path.strip_prefix(self.layer.repodir).ok())
            .map(|path| path.to_string_lossy().into_owned())
            .collect()
    }

    fn machine_description(&self, name: &str) -> String {
        let path = self.layer.layerdir.join("conf/machine").join(format!("{name}.conf"));
        machine_description(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = ?err, "unable to read machine description");
            String::new()
        })
    }

    async fn write_machine(&mut self, name: &str) -> Result<()> {
        let layerbranch = self.layer.layerbranch;
        let description = self.machine_description(name);
        let updated =
            self.snapshot.update_machine(layerbranch, name, &description).await.or_raise(|| ErrorKind::Storage)?;
        if !updated {
            self.snapshot.create_machine(layerbranch, name, &description).await.or_raise(|| ErrorKind::Storage)?;
        }
        self.stats.machines += 1;
        Ok(())
    }

    async fn replace_class(&mut self, name: &str) -> Result<()> {
        let layerbranch = self.layer.layerbranch;
        self.snapshot.delete_class(layerbranch, name).await.or_raise(|| ErrorKind::Storage)?;
        self.snapshot.create_class(layerbranch, name).await.or_raise(|| ErrorKind::Storage)?;
        self.stats.classes += 1;
        Ok(())
    }

    async fn replace_append(&mut self, location: &RecipeLocation) -> Result<()> {
        let layerbranch = self.layer.layerbranch;
        self.snapshot.delete_append(layerbranch, location).await.or_raise(|| ErrorKind::Storage)?;
        self.snapshot.create_append(layerbranch, location).await.or_raise(|| ErrorKind::Storage)?;
        self.stats.appends += 1;
        Ok(())
    }
}

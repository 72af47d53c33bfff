//! Change Detector: sorts a repository diff into per-kind buckets for one layer.

use crate::classify::{Classified, NestedLayers, classify};
use layersync_index::models::RecipeLocation;
use layersync_vcs::{ChangeKind, ChangeSet};
use std::path::{Component, Path, PathBuf};

/// Added, deleted and modified items of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket<T> {
    pub added: Vec<T>,
    pub deleted: Vec<T>,
    pub modified: Vec<T>,
}
impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self { added: Vec::new(), deleted: Vec::new(), modified: Vec::new() }
    }
}
impl<T> Bucket<T> {
    fn push(&mut self, kind: ChangeKind, item: T) {
        match kind {
            ChangeKind::Added => self.added.push(item),
            ChangeKind::Deleted => self.deleted.push(item),
            ChangeKind::Modified => self.modified.push(item),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }
}

/// The part of a diff that concerns one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerChanges {
    pub recipes: Bucket<RecipeLocation>,
    pub appends: Bucket<RecipeLocation>,
    pub machines: Bucket<String>,
    pub classes: Bucket<String>,
    /// Every modified file of the layer, classified or not, relative to the
    /// repository root. Recipes that read one of these are re-extracted.
    pub modified_paths: Vec<String>,
}

/// Keep the changes under `subdir` (empty for the repository root) that are
/// not inside a nested layer, and bucket them by what they denote.
pub fn classify_changes(changes: &ChangeSet, subdir: &str, nested: &NestedLayers) -> LayerChanges {
    let mut layer = LayerChanges::default();
    let subdir = normalize_subdir(subdir);
    for change in changes.iter() {
        let Ok(relative) = change.path.strip_prefix(&subdir) else { continue };
        if nested.contains(relative) {
            continue;
        }
        match classify(relative) {
            Some(Classified::Recipe(location)) => layer.recipes.push(change.kind, location),
            Some(Classified::Append(location)) => layer.appends.push(change.kind, location),
            Some(Classified::Machine(name)) => layer.machines.push(change.kind, name),
            Some(Classified::Class(name)) => layer.classes.push(change.kind, name),
            None => {},
        }
        if change.kind == ChangeKind::Modified {
            layer.modified_paths.push(change.path.to_string_lossy().into_owned());
        }
    }
    layer
}

/// A layer subdirectory in the form git reports paths in: no `.`
/// components, `..` folded into its parent, no leading or trailing separator.
/// Empty for the repository root.
pub(crate) fn normalize_subdir(subdir: &str) -> String {
    let mut normalized = PathBuf::new();
    for component in Path::new(subdir).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                normalized.pop();
            },
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {},
        }
    }
    normalized.to_string_lossy().into_owned()
}

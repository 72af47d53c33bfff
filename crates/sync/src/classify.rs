//! Path Classifier.
//!
//! Decides what a layer-relative path denotes, and which subdirectories of a
//! layer are layers of their own.

use layersync_extract::models::LAYER_CONF;
use layersync_index::models::RecipeLocation;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// What a file inside a layer is, with the identity of the record it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Recipe(RecipeLocation),
    Append(RecipeLocation),
    Machine(String),
    Class(String),
}

/// Classify a path relative to the layer root.
pub fn classify(path: &Path) -> Option<Classified> {
    let filename = path.file_name()?.to_str()?;
    let parent = path.parent().unwrap_or(Path::new(""));
    let extension = path.extension().and_then(|e| e.to_str());
    let stem = path.file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty() && !s.contains('.'));

    if parent == Path::new("conf/machine")
        && extension == Some("conf")
        && let Some(name) = stem
    {
        return Some(Classified::Machine(name.to_string()));
    }
    if extension == Some("bbclass") {
        let dir = parent.to_str()?;
        let is_class_dir = dir == "classes" || (dir.starts_with("classes-") && !dir.contains('/'));
        return match stem {
            Some(name) if is_class_dir => Some(Classified::Class(name.to_string())),
            _ => None,
        };
    }
    let location = || RecipeLocation::new(parent.to_string_lossy(), filename);
    match extension {
        Some("bbappend") => Some(Classified::Append(location())),
        Some("bb") => Some(Classified::Recipe(location())),
        _ => None,
    }
}

/// Subdirectories of a layer that carry their own `conf/layer.conf`.
///
/// Their content belongs to the nested layer, never to the enclosing one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedLayers {
    roots: Vec<PathBuf>,
}
impl NestedLayers {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Walk `layerdir` (skipping `.git`) for nested layer roots, returned
    /// relative to `layerdir`.
    pub fn find(layerdir: &Path) -> Self {
        let mut roots = Vec::new();
        let mut walker = WalkDir::new(layerdir).min_depth(1).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                },
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.file_name() == ".git" {
                walker.skip_current_dir();
                continue;
            }
            if entry.path().join(LAYER_CONF).is_file()
                && let Ok(relative) = entry.path().strip_prefix(layerdir)
            {
                debug!(path = %relative.display(), "found nested layer");
                roots.push(relative.to_path_buf());
                walker.skip_current_dir();
            }
        }
        Self { roots }
    }

    /// Whether a layer-relative path lies inside a nested layer.
    pub fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Classify every file of a layer, skipping `.git` and nested layers.
///
/// Paths in the result are relative to `layerdir`, in walk order.
pub fn scan_layer(layerdir: &Path, nested: &NestedLayers) -> Vec<(PathBuf, Classified)> {
    let mut found = Vec::new();
    let walker = WalkDir::new(layerdir).min_depth(1).sort_by_file_name().into_iter().filter_entry(|entry| {
        if entry.file_name() == ".git" {
            return false;
        }
        entry.path().strip_prefix(layerdir).map(|relative| !nested.contains(relative)).unwrap_or(true)
    });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "unable to read layer directory entry");
                continue;
            },
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(layerdir) else { continue };
        if let Some(classified) = classify(relative) {
            found.push((relative.to_path_buf(), classified));
        }
    }
    found
}

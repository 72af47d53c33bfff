use std::path::{Path, PathBuf};

/// Version assumed for a recipe whose filename carries none (`foo.bb`).
const DEFAULT_PV: &str = "1.0";

/// The typed record extracted from a single recipe file.
///
/// Every field-name lookup against the parsed data happens inside the
/// [`Parser`](crate::Parser) implementation; callers only ever see this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFields {
    /// Logical package name (`PN`).
    pub pn: String,
    /// Package version (`PV`).
    pub pv: String,
    pub summary: String,
    pub description: String,
    pub section: String,
    pub license: String,
    pub homepage: String,
    pub bugtracker: String,
    /// Alternate names this recipe provides (`PROVIDES`).
    pub provides: Vec<String>,
    /// Variants the recipe can be extended into (`BBCLASSEXTEND`).
    pub bbclass_extend: Vec<String>,
    /// Classes inherited by this recipe beyond the globally inherited ones, sorted.
    pub inherits: Vec<String>,
}
impl RecipeFields {
    /// Fallback record used when a recipe cannot be parsed: only the name and
    /// version derived from the filename are known.
    ///
    /// The row still gets written so that it can take part in identity
    /// reconciliation on later runs.
    pub fn from_filename(filename: impl AsRef<Path>) -> Self {
        let (pn, pv) = split_recipe_filename(filename);
        Self { pn, pv, ..Self::default() }
    }
}

/// Result of evaluating one recipe: its fields and the files the evaluation read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub fields: RecipeFields,
    /// Absolute paths of every include, require and class file that was read
    /// while evaluating the recipe. Callers narrow this down to the files
    /// that belong to the layer.
    pub depends_on: Vec<PathBuf>,
}

/// Derive `(pn, pv)` from a recipe filename without parsing it.
///
/// `busybox_1.36.1.bb` becomes `("busybox", "1.36.1")`; anything after a second
/// underscore is ignored and a missing version defaults to `1.0`.
pub fn split_recipe_filename(path: impl AsRef<Path>) -> (String, String) {
    let basename = path.as_ref().file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = basename.split(".bb").next().unwrap_or_default();
    let mut parts = stem.splitn(3, '_');
    let pn = parts.next().unwrap_or_default().to_string();
    let pv = parts.next().map(str::to_string).unwrap_or_else(|| DEFAULT_PV.to_string());
    (pn, pv)
}

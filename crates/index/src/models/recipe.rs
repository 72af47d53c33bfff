use super::{LayerBranchId, RecipeId, from_unix};
use crate::error::Error;
use layersync_extract::models::RecipeFields;
use std::path::PathBuf;
use time::UtcDateTime;

/// Where a recipe lives, relative to its layer's root.
///
/// `filepath` is the directory (empty for the layer root) and `filename`
/// the file itself, matching how recipes are looked up by location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipeLocation {
    pub filepath: String,
    pub filename: String,
}
impl RecipeLocation {
    pub fn new(filepath: impl Into<String>, filename: impl Into<String>) -> Self {
        Self { filepath: filepath.into(), filename: filename.into() }
    }

    /// Layer-relative path of the file.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.filepath).join(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub id: RecipeId,
    pub layerbranch_id: LayerBranchId,
    pub location: RecipeLocation,
    pub fields: RecipeFields,
    pub updated: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecipeRow {
    id: RecipeId,
    layerbranch_id: LayerBranchId,
    filepath: String,
    filename: String,
    pn: String,
    pv: String,
    summary: String,
    description: String,
    section: String,
    license: String,
    homepage: String,
    bugtracker: String,
    provides: String,
    bbclassextend: String,
    inherits: String,
    updated: i64,
}
impl TryFrom<RecipeRow> for Recipe {
    type Error = Error;
    fn try_from(row: RecipeRow) -> Result<Self, Self::Error> {
        let words = |value: &str| value.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        Ok(Self {
            id: row.id,
            layerbranch_id: row.layerbranch_id,
            location: RecipeLocation::new(row.filepath, row.filename),
            fields: RecipeFields {
                pn: row.pn,
                pv: row.pv,
                summary: row.summary,
                description: row.description,
                section: row.section,
                license: row.license,
                homepage: row.homepage,
                bugtracker: row.bugtracker,
                provides: words(&row.provides),
                bbclass_extend: words(&row.bbclassextend),
                inherits: words(&row.inherits),
            },
            updated: from_unix(row.updated, "recipe updated")?,
        })
    }
}

/// Column values for writing [`RecipeFields`], list fields space-joined.
pub(crate) struct FieldColumns<'a> {
    pub(crate) fields: &'a RecipeFields,
    pub(crate) provides: String,
    pub(crate) bbclassextend: String,
    pub(crate) inherits: String,
}
impl<'a> From<&'a RecipeFields> for FieldColumns<'a> {
    fn from(fields: &'a RecipeFields) -> Self {
        Self {
            fields,
            provides: fields.provides.join(" "),
            bbclassextend: fields.bbclass_extend.join(" "),
            inherits: fields.inherits.join(" "),
        }
    }
}

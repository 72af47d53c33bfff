use super::{BranchId, DependencyId, LayerBranchId, LayerId, MaintainerId, from_unix};
use crate::error::{Error, ErrorKind};
use derive_more::Display;
use time::UtcDateTime;

/// A named release line shared by all layers (`master`, `scarthgap`, ...).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub bitbake_branch: String,
    pub short_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBranch {
    pub name: String,
    pub bitbake_branch: String,
    pub short_description: String,
}
impl NewBranch {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayerStatus {
    #[default]
    #[display("P")]
    Published,
    /// Submitted but not yet reviewed; skipped unless named explicitly.
    #[display("N")]
    New,
}
impl TryFrom<&str> for LayerStatus {
    type Error = Error;
    fn try_from(code: &str) -> Result<Self, Self::Error> {
        match code {
            "P" => Ok(Self::Published),
            "N" => Ok(Self::New),
            _ => exn::bail!(ErrorKind::InvalidData("layer status")),
        }
    }
}

/// A layer known to the index, independent of any branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerItem {
    pub id: LayerId,
    pub name: String,
    pub status: LayerStatus,
    pub layer_type: String,
    pub summary: String,
    pub description: String,
    pub vcs_url: String,
    pub vcs_web_url: String,
    /// Imported from the classic (pre-layer) metadata; never synchronised.
    pub classic: bool,
    pub index_preference: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct LayerItemRow {
    id: LayerId,
    name: String,
    status: String,
    layer_type: String,
    summary: String,
    description: String,
    vcs_url: String,
    vcs_web_url: String,
    classic: bool,
    index_preference: i64,
}
impl TryFrom<LayerItemRow> for LayerItem {
    type Error = Error;
    fn try_from(row: LayerItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            status: LayerStatus::try_from(row.status.as_str())?,
            layer_type: row.layer_type,
            summary: row.summary,
            description: row.description,
            vcs_url: row.vcs_url,
            vcs_web_url: row.vcs_web_url,
            classic: row.classic,
            index_preference: row.index_preference,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLayer {
    pub name: String,
    pub vcs_url: String,
    pub status: LayerStatus,
    /// `A` (base), `B` (BSP), `S` (software), `D` (distribution) or `M` (miscellaneous).
    pub layer_type: String,
    pub summary: String,
    pub description: String,
    pub vcs_web_url: String,
    pub classic: bool,
    pub index_preference: i64,
}
impl NewLayer {
    pub fn new(name: impl Into<String>, vcs_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vcs_url: vcs_url.into(),
            status: LayerStatus::Published,
            layer_type: "M".to_string(),
            summary: String::new(),
            description: String::new(),
            vcs_web_url: String::new(),
            classic: false,
            index_preference: 0,
        }
    }
}

/// A layer on a specific branch, with its synchronisation bookkeeping.
///
/// Text fields use the empty string for "unset".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBranch {
    pub id: LayerBranchId,
    pub layer_id: LayerId,
    pub branch_id: BranchId,
    /// `BBFILE_COLLECTIONS` as last read from `conf/layer.conf`.
    pub collection: String,
    pub version: String,
    /// Location of the layer inside its repository; empty for the root.
    pub vcs_subdir: String,
    /// Repository branch to track when it differs from the branch name.
    pub actual_branch: String,
    /// Last revision that was fully synchronised.
    pub vcs_last_rev: String,
    pub vcs_last_commit: Option<UtcDateTime>,
    pub vcs_last_fetch: Option<UtcDateTime>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct LayerBranchRow {
    id: LayerBranchId,
    layer_id: LayerId,
    branch_id: BranchId,
    collection: String,
    version: String,
    vcs_subdir: String,
    actual_branch: String,
    vcs_last_rev: String,
    vcs_last_commit: Option<i64>,
    vcs_last_fetch: Option<i64>,
}
impl TryFrom<LayerBranchRow> for LayerBranch {
    type Error = Error;
    fn try_from(row: LayerBranchRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            layer_id: row.layer_id,
            branch_id: row.branch_id,
            collection: row.collection,
            version: row.version,
            vcs_subdir: row.vcs_subdir,
            actual_branch: row.actual_branch,
            vcs_last_rev: row.vcs_last_rev,
            vcs_last_commit: row.vcs_last_commit.map(|t| from_unix(t, "last commit")).transpose()?,
            vcs_last_fetch: row.vcs_last_fetch.map(|t| from_unix(t, "last fetch")).transpose()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LayerMaintainer {
    pub id: MaintainerId,
    pub layerbranch_id: LayerBranchId,
    pub name: String,
    pub email: String,
    pub responsibility: String,
    /// `A` (active) or `I` (inactive).
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMaintainer {
    pub name: String,
    pub email: String,
    pub responsibility: String,
    pub active: bool,
}

/// A dependency edge from a layer branch to another layer.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LayerDependency {
    pub id: DependencyId,
    pub layerbranch_id: LayerBranchId,
    pub dependency_id: LayerId,
    /// `false` for `LAYERRECOMMENDS` entries.
    pub required: bool,
}

/// A layer branch on the same branch that may satisfy a dependency.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DependencyCandidate {
    pub layer_id: LayerId,
    pub layer_name: String,
    pub layerbranch_id: LayerBranchId,
    pub collection: String,
    pub version: String,
}

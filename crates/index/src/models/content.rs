use super::{AppendId, ClassId, LayerBranchId, MachineId, RecipeLocation, from_unix};
use crate::error::Error;
use time::UtcDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub id: MachineId,
    pub layerbranch_id: LayerBranchId,
    pub name: String,
    pub description: String,
    pub updated: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct MachineRow {
    id: MachineId,
    layerbranch_id: LayerBranchId,
    name: String,
    description: String,
    updated: i64,
}
impl TryFrom<MachineRow> for Machine {
    type Error = Error;
    fn try_from(row: MachineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            layerbranch_id: row.layerbranch_id,
            name: row.name,
            description: row.description,
            updated: from_unix(row.updated, "machine updated")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BBClass {
    pub id: ClassId,
    pub layerbranch_id: LayerBranchId,
    pub name: String,
    pub updated: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct BBClassRow {
    id: ClassId,
    layerbranch_id: LayerBranchId,
    name: String,
    updated: i64,
}
impl TryFrom<BBClassRow> for BBClass {
    type Error = Error;
    fn try_from(row: BBClassRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            layerbranch_id: row.layerbranch_id,
            name: row.name,
            updated: from_unix(row.updated, "class updated")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BBAppend {
    pub id: AppendId,
    pub layerbranch_id: LayerBranchId,
    pub location: RecipeLocation,
    pub updated: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct BBAppendRow {
    id: AppendId,
    layerbranch_id: LayerBranchId,
    filepath: String,
    filename: String,
    updated: i64,
}
impl TryFrom<BBAppendRow> for BBAppend {
    type Error = Error;
    fn try_from(row: BBAppendRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            layerbranch_id: row.layerbranch_id,
            location: RecipeLocation::new(row.filepath, row.filename),
            updated: from_unix(row.updated, "append updated")?,
        })
    }
}

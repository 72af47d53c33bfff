mod content;
mod layer;
mod recipe;

pub use self::content::{BBAppend, BBClass, Machine};
pub(crate) use self::content::{BBAppendRow, BBClassRow, MachineRow};
pub use self::layer::{
    Branch, DependencyCandidate, LayerBranch, LayerDependency, LayerItem, LayerMaintainer, LayerStatus, NewBranch,
    NewLayer, NewMaintainer,
};
pub(crate) use self::layer::{LayerBranchRow, LayerItemRow};
pub(crate) use self::recipe::{FieldColumns, RecipeRow};
pub use self::recipe::{Recipe, RecipeLocation};

use crate::error::{ErrorKind, Result};
use derive_more::{Display, From};
use exn::ResultExt;
use time::UtcDateTime;

macro_rules! id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);
    };
}

id!(BranchId);
id!(LayerId);
id!(
    /// The unit of synchronisation: one layer on one branch.
    LayerBranchId
);
id!(
    /// Stable across renames; see `Snapshot::reclaim_recipe`.
    RecipeId
);
id!(MaintainerId);
id!(DependencyId);
id!(MachineId);
id!(ClassId);
id!(AppendId);

pub(crate) fn from_unix(timestamp: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(timestamp).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn now() -> i64 {
    UtcDateTime::now().unix_timestamp()
}

mod bitbake;
mod consts;
mod context;
pub mod error;
mod machine;
pub mod models;

use crate::error::Result;
use crate::models::{Extraction, LayerConf};
use std::path::Path;

pub use crate::bitbake::BitbakeParser;
pub use crate::context::ParserContext;
pub use crate::machine::machine_description;

/// The metadata extraction collaborator.
///
/// Implementations turn layer and recipe files into typed records. All
/// memoisation lives in the [`ParserContext`] passed in by the caller, so an
/// implementation is free to be a plain unit struct.
pub trait Parser {
    /// Build the run-wide context from the toolkit checkout.
    ///
    /// Fails when the checkout has no base configuration; nothing can be
    /// parsed without it.
    fn prepare(&self, toolkit_dir: &Path) -> Result<ParserContext>;

    /// Evaluate `conf/layer.conf` for the layer rooted at `layerdir`.
    fn setup_layer(&self, ctx: &mut ParserContext, layerdir: &Path) -> Result<LayerConf>;

    /// Evaluate one recipe against its layer's configuration.
    fn parse_recipe(&self, ctx: &mut ParserContext, layer: &LayerConf, recipe: &Path) -> Result<Extraction>;
}

mod layer;
mod recipe;

pub use self::layer::{LAYER_CONF, LayerConf};
pub use self::recipe::{Extraction, RecipeFields, split_recipe_filename};

/// Split a whitespace-separated variable value into its words.
pub(crate) fn words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

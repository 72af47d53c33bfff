use super::words;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Relative location of the configuration file that marks a directory as a layer.
pub const LAYER_CONF: &str = "conf/layer.conf";

/// Configuration data for one layer: the global variables plus everything its
/// `conf/layer.conf` set, fully expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerConf {
    layerdir: PathBuf,
    vars: BTreeMap<String, String>,
}
impl LayerConf {
    pub fn new(layerdir: impl Into<PathBuf>, vars: BTreeMap<String, String>) -> Self {
        Self { layerdir: layerdir.into(), vars }
    }

    pub fn layerdir(&self) -> &Path {
        &self.layerdir
    }

    /// All variables, used to seed recipe evaluation.
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Trimmed value of a variable; empty values count as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// The collection name declared by `BBFILE_COLLECTIONS`.
    pub fn collection(&self) -> Option<&str> {
        self.get("BBFILE_COLLECTIONS")
    }

    /// The collection version declared by `LAYERVERSION_<collection>`.
    pub fn version(&self) -> Option<&str> {
        self.collection().and_then(|c| self.get(&format!("LAYERVERSION_{c}")))
    }

    /// Search path for classes and includes (`BBPATH`), layer directory first.
    pub fn bbpath(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.layerdir.clone()];
        for entry in self.get("BBPATH").unwrap_or_default().split(':') {
            let entry = entry.trim();
            if entry.is_empty() || entry.contains("${") {
                continue;
            }
            let entry = PathBuf::from(entry);
            if !paths.contains(&entry) {
                paths.push(entry);
            }
        }
        paths
    }

    /// Globally inherited classes (`INHERIT`), which are excluded from each
    /// recipe's own inherit list.
    pub fn global_inherits(&self) -> Vec<String> {
        words(self.get("INHERIT").unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(pairs: &[(&str, &str)]) -> LayerConf {
        let vars = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        LayerConf::new("/layers/meta-foo", vars)
    }

    #[test]
    fn test_collection_and_version() {
        let layer = conf(&[("BBFILE_COLLECTIONS", " foo "), ("LAYERVERSION_foo", "3")]);
        assert_eq!(layer.collection(), Some("foo"));
        assert_eq!(layer.version(), Some("3"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let layer = conf(&[("BBFILE_COLLECTIONS", "  ")]);
        assert_eq!(layer.collection(), None);
        assert_eq!(layer.version(), None);
    }

    #[test]
    fn test_bbpath_starts_with_layerdir() {
        let layer = conf(&[("BBPATH", ":/layers/meta-foo:/layers/meta-bar:${TOPDIR}")]);
        assert_eq!(layer.bbpath(), vec![PathBuf::from("/layers/meta-foo"), PathBuf::from("/layers/meta-bar")]);
    }
}

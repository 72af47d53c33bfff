use crate::bitbake::statement::{self, Statement};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Class directories searched below every `BBPATH` entry, in order.
const CLASS_DIRS: [&str; 3] = ["classes-recipe", "classes", "classes-global"];

/// Run-scoped parser state.
///
/// Holds the base configuration read from the toolkit checkout plus caches of
/// parsed metadata files and class locations. The caches must not outlive a
/// single layer: [`ParserContext::reset`] is called after every layer so that
/// one layer's checkout never leaks into the next layer's results.
#[derive(Debug, Default)]
pub struct ParserContext {
    globals: BTreeMap<String, String>,
    statements: HashMap<PathBuf, (Option<SystemTime>, Arc<[Statement]>)>,
    classes: HashMap<(PathBuf, String), Option<PathBuf>>,
}
impl ParserContext {
    pub fn new(globals: BTreeMap<String, String>) -> Self {
        Self { globals, ..Self::default() }
    }

    /// Base configuration every layer evaluation starts from.
    pub fn globals(&self) -> &BTreeMap<String, String> {
        &self.globals
    }

    /// Number of metadata files currently cached.
    pub fn cached_files(&self) -> usize {
        self.statements.len()
    }

    /// Drop all cached files and class lookups, keeping the base configuration.
    pub fn reset(&mut self) {
        self.statements.clear();
        self.classes.clear();
    }

    /// Parsed statements for a metadata file, re-read when its mtime changed.
    pub(crate) fn statements(&mut self, path: &Path) -> Result<Arc<[Statement]>> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        if let Some((cached_at, statements)) = self.statements.get(path)
            && *cached_at == modified
        {
            return Ok(Arc::clone(statements));
        }
        let bytes = std::fs::read(path).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let parsed: Arc<[Statement]> = statement::parse(path, &String::from_utf8_lossy(&bytes))?.into();
        self.statements.insert(path.to_path_buf(), (modified, Arc::clone(&parsed)));
        Ok(parsed)
    }

    /// Find `<name>.bbclass` in the class directories of the search path.
    pub(crate) fn locate_class(&mut self, name: &str, search: &[PathBuf]) -> Option<PathBuf> {
        let key = (search.first().cloned().unwrap_or_default(), name.to_string());
        self.classes
            .entry(key)
            .or_insert_with(|| {
                search
                    .iter()
                    .flat_map(|dir| CLASS_DIRS.iter().map(move |sub| dir.join(sub).join(format!("{name}.bbclass"))))
                    .find(|candidate| candidate.is_file())
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_statement_cache_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.inc");
        fs::write(&file, "A = \"1\"\n").unwrap();

        let mut ctx = ParserContext::new(BTreeMap::from([("X".to_string(), "y".to_string())]));
        let first = ctx.statements(&file).unwrap();
        let second = ctx.statements(&file).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ctx.cached_files(), 1);

        ctx.reset();
        assert_eq!(ctx.cached_files(), 0);
        assert_eq!(ctx.globals().get("X").map(String::as_str), Some("y"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let mut ctx = ParserContext::default();
        let err = ctx.statements(Path::new("/nonexistent/layersync/a.inc")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Read(_)));
    }

    #[test]
    fn test_locate_class_prefers_recipe_classes() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["classes", "classes-recipe"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join("foo.bbclass"), "").unwrap();
        }
        let mut ctx = ParserContext::default();
        let search = vec![dir.path().to_path_buf()];
        assert_eq!(ctx.locate_class("foo", &search), Some(dir.path().join("classes-recipe/foo.bbclass")));
        assert_eq!(ctx.locate_class("bar", &search), None);
    }
}

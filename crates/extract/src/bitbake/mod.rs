//! A BitBake-subset evaluator.
//!
//! Reads recipes, include files and classes well enough to recover the
//! descriptive variables a layer index cares about. Tasks, python and the
//! fetcher are out of reach: inline `${@...}` expressions stay verbatim.

mod data;
pub(crate) mod statement;

use self::data::DataStore;
use self::statement::Statement;
use crate::context::ParserContext;
use crate::error::{ErrorKind, Result};
use crate::models::{Extraction, LAYER_CONF, LayerConf, RecipeFields, split_recipe_filename, words};
use crate::Parser;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Includes nested deeper than this are treated as a cycle.
const MAX_INCLUDE_DEPTH: usize = 24;

/// Base configuration file inside the toolkit checkout.
const TOOLKIT_CONF: &str = "conf/bitbake.conf";

/// Global defaults that would otherwise leak into every recipe lacking its own value.
const CLEARED_GLOBALS: [&str; 4] = ["SUMMARY", "DESCRIPTION", "HOMEPAGE", "LICENSE"];

/// Classes every recipe inherits implicitly.
const IMPLICIT_CLASSES: [&str; 1] = ["base"];

#[derive(Debug, Clone, Copy, Default)]
pub struct BitbakeParser;

impl Parser for BitbakeParser {
    #[instrument(skip(self))]
    fn prepare(&self, toolkit_dir: &Path) -> Result<ParserContext> {
        let mut ctx = ParserContext::default();
        let mut data = DataStore::default();
        let conf = toolkit_dir.join(TOOLKIT_CONF);
        if !conf.is_file() {
            exn::bail!(ErrorKind::MissingToolkit(conf));
        }
        let mut eval = Evaluation::new(&mut ctx, &mut data, vec![toolkit_dir.to_path_buf()], toolkit_dir);
        // A broken base file must not prevent any layer from being parsed.
        if let Err(err) = eval.run(&conf, 0) {
            warn!(path = %conf.display(), error = ?err, "unable to evaluate toolkit configuration");
        }
        for var in CLEARED_GLOBALS {
            data.set(var, "");
        }
        Ok(ParserContext::new(data.finalize()))
    }

    #[instrument(skip(self, ctx))]
    fn setup_layer(&self, ctx: &mut ParserContext, layerdir: &Path) -> Result<LayerConf> {
        let conf = layerdir.join(LAYER_CONF);
        if !conf.is_file() {
            exn::bail!(ErrorKind::MissingLayerConf(conf));
        }
        let mut data = DataStore::from_vars(ctx.globals());
        data.set("LAYERDIR", layerdir.to_string_lossy());
        let search = vec![layerdir.to_path_buf()];
        Evaluation::new(ctx, &mut data, search, layerdir).run(&conf, 0)?;
        Ok(LayerConf::new(layerdir, data.finalize()))
    }

    #[instrument(skip(self, ctx, layer), fields(layer = %layer.layerdir().display()))]
    fn parse_recipe(&self, ctx: &mut ParserContext, layer: &LayerConf, recipe: &Path) -> Result<Extraction> {
        let (filename_pn, filename_pv) = split_recipe_filename(recipe);
        let recipe_dir = recipe.parent().unwrap_or(layer.layerdir()).to_path_buf();

        let mut data = DataStore::from_vars(layer.vars());
        data.set("FILE", recipe.to_string_lossy());
        data.set("FILE_DIRNAME", recipe_dir.to_string_lossy());
        data.set("THISDIR", recipe_dir.to_string_lossy());
        data.set("PN", filename_pn.as_str());
        data.set("BPN", "${PN}");
        data.set("PV", filename_pv.as_str());
        data.set("P", "${PN}-${PV}");
        data.set("BP", "${BPN}-${PV}");

        let mut eval = Evaluation::new(ctx, &mut data, layer.bbpath(), &recipe_dir);
        eval.run(recipe, 0)?;
        let Evaluation { inherited, depends_on, .. } = eval;

        let get = |var: &str| data.get(var).map(|v| v.trim().to_string()).unwrap_or_default();
        let resolved = |value: String, fallback: String| {
            if value.is_empty() || value.contains("${") { fallback } else { value }
        };
        let global: BTreeSet<String> = layer
            .global_inherits()
            .into_iter()
            .chain(IMPLICIT_CLASSES.iter().map(|c| c.to_string()))
            .collect();
        let fields = RecipeFields {
            pn: resolved(get("PN"), filename_pn),
            pv: resolved(get("PV"), filename_pv),
            summary: get("SUMMARY"),
            description: get("DESCRIPTION"),
            section: get("SECTION"),
            license: get("LICENSE"),
            homepage: get("HOMEPAGE"),
            bugtracker: get("BUGTRACKER"),
            provides: words(&get("PROVIDES")),
            bbclass_extend: words(&get("BBCLASSEXTEND")),
            inherits: inherited.difference(&global).cloned().collect(),
        };
        Ok(Extraction { fields, depends_on })
    }
}

/// One evaluation pass: a data store plus the files it has read so far.
struct Evaluation<'a> {
    ctx: &'a mut ParserContext,
    data: &'a mut DataStore,
    search: Vec<PathBuf>,
    base_dir: PathBuf,
    inherited: BTreeSet<String>,
    depends_on: Vec<PathBuf>,
}
impl<'a> Evaluation<'a> {
    fn new(ctx: &'a mut ParserContext, data: &'a mut DataStore, search: Vec<PathBuf>, base_dir: &Path) -> Self {
        Self {
            ctx,
            data,
            search,
            base_dir: base_dir.to_path_buf(),
            inherited: BTreeSet::new(),
            depends_on: Vec::new(),
        }
    }

    fn run(&mut self, file: &Path, depth: usize) -> Result<()> {
        if depth > MAX_INCLUDE_DEPTH {
            exn::bail!(ErrorKind::IncludeDepth(file.to_path_buf()));
        }
        let statements = self.ctx.statements(file)?;
        for statement in statements.iter() {
            match statement {
                Statement::Assign { var, op, value } => {
                    let var = self.data.expand(var);
                    self.data.apply(&var, *op, value);
                },
                Statement::Unset(var) => {
                    let var = self.data.expand(var);
                    self.data.unset(&var);
                },
                Statement::Inherit(classes) => {
                    for class in words(&self.data.expand(classes)) {
                        self.inherit(&class, depth)?;
                    }
                },
                Statement::Include { path, required } => self.include(file, path, *required, depth)?,
            }
        }
        Ok(())
    }

    fn inherit(&mut self, class: &str, depth: usize) -> Result<()> {
        if class.contains("${") || !self.inherited.insert(class.to_string()) {
            return Ok(());
        }
        match self.ctx.locate_class(class, &self.search) {
            Some(path) => {
                self.record(&path);
                self.run(&path, depth + 1)
            },
            None => {
                debug!(class, "class not found");
                Ok(())
            },
        }
    }

    fn include(&mut self, from: &Path, path: &str, required: bool, depth: usize) -> Result<()> {
        let expanded = self.data.expand(path);
        let found = if expanded.contains("${") { None } else { self.resolve_include(from, &expanded) };
        match found {
            Some(target) => {
                self.record(&target);
                self.run(&target, depth + 1)
            },
            None if required => exn::bail!(ErrorKind::MissingRequire(expanded)),
            None => {
                debug!(path = %expanded, "optional include not found");
                Ok(())
            },
        }
    }

    fn resolve_include(&self, from: &Path, path: &str) -> Option<PathBuf> {
        let path = Path::new(path);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        from.parent()
            .into_iter()
            .chain(std::iter::once(self.base_dir.as_path()))
            .chain(self.search.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }

    fn record(&mut self, path: &Path) {
        if !self.depends_on.iter().any(|p| p == path) {
            self.depends_on.push(path.to_path_buf());
        }
    }
}

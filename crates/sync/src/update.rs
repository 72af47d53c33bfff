//! Run orchestration: one `update` invocation from branch lookup to lock release.

use crate::changes::{classify_changes, normalize_subdir};
use crate::classify::NestedLayers;
use crate::depends::{refresh_collection, resolve_dependencies};
use crate::error::{ErrorKind, Result};
use crate::fetch::{FetchReport, Fetcher};
use crate::lock::RunLock;
use crate::reconcile::{LayerScope, Reconciler};
use crate::transaction::{Coordinator, LayerOutcome, TransactionOutcome};
use exn::{OptionExt, ResultExt};
use layersync_config::Settings;
use layersync_extract::models::LAYER_CONF;
use layersync_extract::{BitbakeParser, Parser, ParserContext};
use layersync_index::models::{Branch, LayerBranch, LayerItem};
use layersync_index::{Database, Snapshot};
use layersync_vcs::Git;
use time::UtcDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Index branch to update.
    pub branch: String,
    /// Layers to update by name; empty for every published layer.
    pub layers: Vec<String>,
    /// Re-read every layer even when its revision has not moved.
    pub reload: bool,
    /// Like `reload`, but discard existing recipe rows first.
    pub full_reload: bool,
    /// Do everything, then roll back.
    pub dry_run: bool,
    pub no_fetch: bool,
    /// Use the repositories as they are checked out (`HEAD`).
    pub no_checkout: bool,
}
impl UpdateOptions {
    pub fn new(branch: impl Into<String>) -> Self {
        Self { branch: branch.into(), ..Self::default() }
    }

    pub fn reload(&self) -> bool {
        self.reload || self.full_reload
    }
}

/// Layer names by how their update ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub updated: Vec<String>,
    pub up_to_date: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub interrupted: bool,
}
impl RunSummary {
    fn record(&mut self, layer: &str, outcome: &TransactionOutcome) {
        let bucket = match outcome {
            TransactionOutcome::Committed(LayerOutcome::Updated(_))
            | TransactionOutcome::RolledBack(LayerOutcome::Updated(_)) => &mut self.updated,
            TransactionOutcome::Committed(LayerOutcome::UpToDate)
            | TransactionOutcome::RolledBack(LayerOutcome::UpToDate) => &mut self.up_to_date,
            TransactionOutcome::Committed(LayerOutcome::Skipped(_))
            | TransactionOutcome::RolledBack(LayerOutcome::Skipped(_)) => &mut self.skipped,
            TransactionOutcome::Failed(_) => &mut self.failed,
            TransactionOutcome::Interrupted => {
                self.interrupted = true;
                return;
            },
        };
        bucket.push(layer.to_string());
    }
}

pub struct Updater<P = BitbakeParser> {
    settings: Settings,
    db: Database,
    fetcher: Fetcher,
    parser: P,
}

impl Updater<BitbakeParser> {
    pub fn new(settings: Settings, db: Database, git: Git) -> Self {
        Self::with_parser(settings, db, git, BitbakeParser)
    }
}

impl<P: Parser> Updater<P> {
    pub fn with_parser(settings: Settings, db: Database, git: Git, parser: P) -> Self {
        let fetcher = Fetcher::new(git, &settings.fetch_dir);
        Self { settings, db, fetcher, parser }
    }

    /// Update the selected layers on one branch.
    ///
    /// Only run-fatal problems are returned as errors; a layer that fails is
    /// rolled back, logged and listed in the summary.
    #[instrument(skip_all, fields(branch = %options.branch))]
    pub async fn run(&self, options: &UpdateOptions, cancel: CancellationToken) -> Result<RunSummary> {
        let catalog = self.db.catalog();
        let branch = catalog
            .branch(&options.branch)
            .await
            .or_raise(|| ErrorKind::Storage)?
            .ok_or_raise(|| ErrorKind::BranchNotFound(options.branch.clone()))?;
        let layers = catalog.layers_for_update(&options.layers).await.or_raise(|| ErrorKind::Storage)?;
        if layers.is_empty() {
            exn::bail!(ErrorKind::NoLayers);
        }

        let fetch_dir = &self.settings.fetch_dir;
        tokio::fs::create_dir_all(fetch_dir).await.or_raise(|| ErrorKind::Lock(fetch_dir.clone()))?;
        let lock = RunLock::acquire(&self.settings.lock_file(), self.settings.lock.timeout()).await?;
        let result = self.run_locked(&branch, &layers, options, cancel).await;
        lock.release();
        result
    }

    async fn run_locked(
        &self,
        branch: &Branch,
        layers: &[LayerItem],
        options: &UpdateOptions,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let report = if options.no_fetch {
            FetchReport::default()
        } else {
            let report = self.fetcher.fetch_all(layers.iter().map(|layer| layer.vcs_url.as_str()), &cancel).await;
            if cancel.is_cancelled() {
                warn!("interrupted while fetching");
                summary.interrupted = true;
                return Ok(summary);
            }
            if report.fetched.is_empty() {
                error!("no repositories could be fetched");
                exn::bail!(ErrorKind::NothingFetched);
            }
            info!(url = %self.settings.toolkit.url, "fetching parser toolkit");
            self.fetcher
                .fetch_into(&self.settings.toolkit.url, &self.settings.toolkit_dir())
                .await
                .or_raise(|| ErrorKind::Toolkit)?;
            report
        };

        let ctx = self.prepare_parser(branch, options).await?;
        let mut coordinator = Coordinator::new(self.db.clone(), ctx, cancel, options.dry_run);
        for layer in layers {
            if report.is_failed(&layer.vcs_url) {
                info!(layer = %layer.name, url = %layer.vcs_url, "skipping layer, fetch of its repository failed");
                summary.skipped.push(layer.name.clone());
                continue;
            }
            let outcome = coordinator
                .with_layer_transaction(&layer.name, async |snapshot, ctx| {
                    self.update_layer(snapshot, ctx, branch, layer, options).await
                })
                .await;
            summary.record(&layer.name, &outcome);
            if outcome.is_interrupted() {
                warn!(layer = %layer.name, "update interrupted, changes rolled back");
                break;
            }
        }
        info!(
            updated = summary.updated.len(),
            up_to_date = summary.up_to_date.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "update finished"
        );
        Ok(summary)
    }

    /// Check out the toolkit revision matching the branch and build the
    /// run-wide parser context from it.
    async fn prepare_parser(&self, branch: &Branch, options: &UpdateOptions) -> Result<ParserContext> {
        let toolkit_dir = self.settings.toolkit_dir();
        if !toolkit_dir.is_dir() {
            error!(path = %toolkit_dir.display(), "parser toolkit is not checked out");
            exn::bail!(ErrorKind::Toolkit);
        }
        if !options.no_checkout && !branch.bitbake_branch.is_empty() && toolkit_dir.is_dir() {
            let toolkit = self.fetcher.git().open(&toolkit_dir);
            let rev = format!("origin/{}", branch.bitbake_branch);
            toolkit.checkout(&rev).await.or_raise(|| ErrorKind::Toolkit)?;
        }
        self.parser.prepare(&toolkit_dir).or_raise(|| ErrorKind::Toolkit)
    }

    #[instrument(skip_all, fields(layer = %layer.name))]
    async fn update_layer(
        &self,
        snapshot: &mut Snapshot,
        ctx: &mut ParserContext,
        branch: &Branch,
        layer: &LayerItem,
        options: &UpdateOptions,
    ) -> Result<LayerOutcome> {
        let repository = self.fetcher.repository(&layer.vcs_url);
        let existing = snapshot.layer_branch(layer.id, branch.id).await.or_raise(|| ErrorKind::Storage)?;

        let tracked = existing
            .as_ref()
            .map(|lb| lb.actual_branch.as_str())
            .filter(|actual| !actual.is_empty())
            .unwrap_or(branch.name.as_str());
        let branch_desc =
            if tracked == branch.name { branch.name.clone() } else { format!("{} ({tracked})", branch.name) };
        let top_ref = if options.no_checkout { "HEAD".to_string() } else { format!("origin/{tracked}") };

        let Some(mut top) = repository.resolve(&top_ref).await.or_raise(|| ErrorKind::Repository)? else {
            if existing.is_some() {
                exn::bail!(ErrorKind::MissingBranch(format!("{} on {branch_desc}", layer.name)));
            }
            info!(branch = %branch_desc, "skipping layer, branch does not exist");
            return Ok(LayerOutcome::Skipped(format!("branch {branch_desc} does not exist")));
        };

        let (mut layerbranch, is_new) = match existing {
            Some(layerbranch) => (layerbranch, false),
            None => (self.create_layer_branch(snapshot, branch, layer).await?, true),
        };
        let subdir = normalize_subdir(&layerbranch.vcs_subdir);

        if !subdir.is_empty() && !options.no_checkout {
            match repository.last_commit_touching(&top_ref, &subdir).await.or_raise(|| ErrorKind::Repository)? {
                Some(rev) => top = rev,
                None => return missing_subdirectory(is_new, layer, &subdir, &branch_desc),
            }
        }

        let outcome = if layerbranch.vcs_last_rev != top || options.reload() {
            if !options.no_checkout {
                repository.checkout(&top_ref).await.or_raise(|| ErrorKind::Repository)?;
                repository.clean().await.or_raise(|| ErrorKind::Repository)?;
            }
            let repodir = repository.path();
            let layerdir = if subdir.is_empty() { repodir.to_path_buf() } else { repodir.join(&subdir) };
            if !subdir.is_empty() && !layerdir.is_dir() {
                return missing_subdirectory(is_new, layer, &subdir, &branch_desc);
            }
            if !layerdir.join(LAYER_CONF).is_file() {
                exn::bail!(ErrorKind::InvalidLayer(format!(
                    "{}: {LAYER_CONF} not found, is the subdirectory set correctly?",
                    layer.name
                )));
            }

            info!(branch = %branch_desc, "collecting data for layer");
            let conf = self.parser.setup_layer(ctx, &layerdir).or_raise(|| ErrorKind::InvalidLayer(layer.name.clone()))?;
            refresh_collection(&mut layerbranch, &conf);
            let dependencies = resolve_dependencies(snapshot, &layerbranch, &layer.name, &conf).await?;
            debug!(added = dependencies.added, unresolved = dependencies.unresolved, "resolved layer dependencies");

            let nested = NestedLayers::find(&layerdir);
            let changes = if !layerbranch.vcs_last_rev.is_empty() && !options.reload() {
                match repository.diff(&layerbranch.vcs_last_rev, &top).await {
                    Ok(diff) => Some(classify_changes(&diff, &subdir, &nested)),
                    Err(err) => {
                        warn!(error = ?err, "unable to diff from the last revision, falling back to a full scan");
                        None
                    },
                }
            } else {
                None
            };

            let scope = LayerScope { layerbranch: layerbranch.id, repodir, layerdir: &layerdir, conf: &conf, nested: &nested };
            let reconciler = Reconciler::new(snapshot, &self.parser, ctx, scope);
            let stats = match changes {
                Some(changes) => reconciler.apply_changes(changes).await?,
                None => reconciler.rescan(options.full_reload).await?,
            };
            info!(
                added = stats.recipes_added,
                reclaimed = stats.recipes_reclaimed,
                updated = stats.recipes_updated,
                deleted = stats.recipes_deleted,
                failures = stats.extraction_failures,
                "layer reconciled"
            );

            layerbranch.vcs_last_commit = Some(repository.commit_time(&top).await.or_raise(|| ErrorKind::Repository)?);
            layerbranch.vcs_last_rev = top;
            LayerOutcome::Updated(stats)
        } else {
            info!(branch = %branch_desc, "layer is already up to date");
            LayerOutcome::UpToDate
        };

        layerbranch.vcs_last_fetch = Some(UtcDateTime::now());
        snapshot.save_layer_branch(&layerbranch).await.or_raise(|| ErrorKind::Storage)?;
        Ok(outcome)
    }

    /// Create the layer branch, seeded from the same layer on the default
    /// branch, or failing that on any other branch.
    async fn create_layer_branch(&self, snapshot: &mut Snapshot, branch: &Branch, layer: &LayerItem) -> Result<LayerBranch> {
        let mut created = snapshot.create_layer_branch(layer.id, branch.id).await.or_raise(|| ErrorKind::Storage)?;
        let sources = snapshot
            .layer_branches(layer.id, &self.settings.default_branch)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        if let Some(source) = sources.iter().find(|source| source.id != created.id) {
            debug!(source = %source.id, "seeding new layer branch");
            snapshot.seed_layer_branch(&mut created, source).await.or_raise(|| ErrorKind::Storage)?;
        }
        Ok(created)
    }
}

/// A layer branch that has never been indexed is skipped quietly; an
/// established one has lost its content and needs attention.
fn missing_subdirectory(is_new: bool, layer: &LayerItem, subdir: &str, branch_desc: &str) -> Result<LayerOutcome> {
    if is_new {
        info!(subdir, branch = %branch_desc, "skipping layer, subdirectory does not exist on this branch");
        return Ok(LayerOutcome::Skipped(format!("subdirectory {subdir} does not exist")));
    }
    exn::bail!(ErrorKind::MissingSubdirectory(format!("{subdir} for {} on {branch_desc}", layer.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{LAYER_CONF as LAYER_CONF_TEXT, commit_all, git, git_available, init_repo, remove, write};
    use layersync_config::ToolkitSettings;
    use layersync_index::models::{NewBranch, NewLayer};
    use std::path::PathBuf;

    struct Fixture {
        dir: tempfile::TempDir,
        db: Database,
        updater: Updater,
    }

    impl Fixture {
        /// Upstream repositories live under `upstream/`, clones under `fetch/`.
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let toolkit = dir.path().join("upstream/bitbake");
            init_repo(&toolkit);
            write(&toolkit, "conf/bitbake.conf", "BB_VERSION = \"1\"\nLICENSE = \"INVALID\"\n");
            commit_all(&toolkit, "toolkit");

            let settings = Settings {
                database: dir.path().join("index.db"),
                fetch_dir: dir.path().join("fetch"),
                toolkit: ToolkitSettings { url: toolkit.to_string_lossy().into_owned(), name: "bitbake".to_string() },
                ..Settings::default()
            };
            let db = Database::connect_in_memory().await.unwrap();
            let mut master = NewBranch::new("master");
            master.bitbake_branch = "master".to_string();
            db.catalog().create_branch(&master).await.unwrap();
            let updater = Updater::new(settings, db.clone(), Git::discover().unwrap());
            Self { dir, db, updater }
        }

        fn upstream(&self, name: &str) -> PathBuf {
            self.dir.path().join("upstream").join(name)
        }

        /// Create an upstream layer repository and register it.
        async fn add_layer(&self, name: &str) -> LayerItem {
            let repo = self.upstream(name);
            init_repo(&repo);
            write(&repo, "conf/layer.conf", LAYER_CONF_TEXT);
            write(&repo, "recipes-a/foo/foo_1.0.bb", "SUMMARY = \"Foo\"\n");
            write(&repo, "conf/machine/board.conf", "#@NAME: Board\n");
            commit_all(&repo, "initial");
            let url = repo.to_string_lossy().into_owned();
            self.db.catalog().create_layer(&NewLayer::new(name, url)).await.unwrap()
        }

        async fn run(&self, options: &UpdateOptions) -> RunSummary {
            self.updater.run(options, CancellationToken::new()).await.unwrap()
        }

        async fn layer_branch(&self, layer: &LayerItem) -> LayerBranch {
            let branch = self.db.catalog().branch("master").await.unwrap().unwrap();
            self.db.catalog().layer_branch(layer.id, branch.id).await.unwrap().unwrap()
        }
    }

    fn names(layers: &[&str]) -> Vec<String> {
        layers.iter().map(|l| l.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_run_then_up_to_date() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let layer = fx.add_layer("meta-foo").await;
        let options = UpdateOptions::new("master");

        let summary = fx.run(&options).await;
        assert_eq!(summary.updated, names(&["meta-foo"]));
        let lb = fx.layer_branch(&layer).await;
        assert_eq!(lb.collection, "foo");
        assert_eq!(lb.version, "2");
        assert_eq!(lb.vcs_last_rev, git(&fx.upstream("meta-foo"), &["rev-parse", "HEAD"]));
        assert!(lb.vcs_last_commit.is_some());
        let recipes = fx.db.catalog().recipes(lb.id).await.unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].fields.summary, "Foo");
        assert_eq!(fx.db.catalog().machines(lb.id).await.unwrap().len(), 1);

        let summary = fx.run(&options).await;
        assert_eq!(summary.up_to_date, names(&["meta-foo"]));
        let again = fx.layer_branch(&layer).await;
        assert_eq!(again.vcs_last_rev, lb.vcs_last_rev);
        assert!(again.vcs_last_fetch >= lb.vcs_last_fetch);
    }

    #[tokio::test]
    async fn test_incremental_update_preserves_recipe_identity() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let layer = fx.add_layer("meta-foo").await;
        let options = UpdateOptions::new("master");
        fx.run(&options).await;
        let lb = fx.layer_branch(&layer).await;
        let before = fx.db.catalog().recipes(lb.id).await.unwrap();

        let repo = fx.upstream("meta-foo");
        remove(&repo, "recipes-a/foo/foo_1.0.bb");
        write(&repo, "recipes-a/foo/foo_1.1.bb", "SUMMARY = \"Foo\"\n");
        write(&repo, "recipes-a/bar/bar_2.0.bb", "");
        remove(&repo, "conf/machine/board.conf");
        let head = commit_all(&repo, "upgrade foo");

        let summary = fx.run(&options).await;
        assert_eq!(summary.updated, names(&["meta-foo"]));
        let lb = fx.layer_branch(&layer).await;
        assert_eq!(lb.vcs_last_rev, head);
        let after = fx.db.catalog().recipes(lb.id).await.unwrap();
        assert_eq!(after.len(), 2);
        let foo = after.iter().find(|r| r.fields.pn == "foo").unwrap();
        assert_eq!(foo.id, before[0].id);
        assert_eq!(foo.fields.pv, "1.1");
        assert!(fx.db.catalog().machines(lb.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let layer = fx.add_layer("meta-foo").await;
        let options = UpdateOptions { dry_run: true, ..UpdateOptions::new("master") };
        let summary = fx.run(&options).await;
        assert_eq!(summary.updated, names(&["meta-foo"]));
        let branch = fx.db.catalog().branch("master").await.unwrap().unwrap();
        assert!(fx.db.catalog().layer_branch(layer.id, branch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_established_layer_untouched() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let layer = fx.add_layer("meta-foo").await;
        fx.run(&UpdateOptions::new("master")).await;
        let catalog = fx.db.catalog();
        let lb = fx.layer_branch(&layer).await;
        let recipes = catalog.recipes(lb.id).await.unwrap();
        let classes = catalog.classes(lb.id).await.unwrap();
        let machines = catalog.machines(lb.id).await.unwrap();

        let repo = fx.upstream("meta-foo");
        remove(&repo, "recipes-a/foo/foo_1.0.bb");
        write(&repo, "recipes-a/foo/foo_1.1.bb", "SUMMARY = \"Foo upgraded\"\n");
        write(&repo, "recipes-a/bar/bar_2.0.bb", "");
        write(&repo, "classes/thing.bbclass", "");
        remove(&repo, "conf/machine/board.conf");
        write(&repo, "conf/machine/other.conf", "#@NAME: Other\n");
        let head = commit_all(&repo, "rework");

        let options = UpdateOptions { dry_run: true, ..UpdateOptions::new("master") };
        let summary = fx.run(&options).await;
        assert_eq!(summary.updated, names(&["meta-foo"]));
        assert_eq!(fx.layer_branch(&layer).await, lb);
        assert_eq!(catalog.recipes(lb.id).await.unwrap(), recipes);
        assert_eq!(catalog.classes(lb.id).await.unwrap(), classes);
        assert_eq!(catalog.machines(lb.id).await.unwrap(), machines);

        // The real run still sees the change.
        let summary = fx.run(&UpdateOptions::new("master")).await;
        assert_eq!(summary.updated, names(&["meta-foo"]));
        assert_eq!(fx.layer_branch(&layer).await.vcs_last_rev, head);
        assert_eq!(catalog.classes(lb.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_branch_skips_new_layer_branch() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let layer = fx.add_layer("meta-foo").await;
        let dunfell = fx.db.catalog().create_branch(&NewBranch::new("dunfell")).await.unwrap();

        let summary = fx.run(&UpdateOptions::new("dunfell")).await;
        assert_eq!(summary.skipped, names(&["meta-foo"]));
        assert!(fx.db.catalog().layer_branch(layer.id, dunfell.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subdirectory_layer_and_missing_conf() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let repo = fx.upstream("meta-multi");
        init_repo(&repo);
        write(&repo, "meta-one/conf/layer.conf", LAYER_CONF_TEXT);
        write(&repo, "meta-one/recipes-a/one/one_1.0.bb", "");
        write(&repo, "meta-two/recipes-b/two/two_1.0.bb", "");
        commit_all(&repo, "initial");
        let url = repo.to_string_lossy().into_owned();
        let catalog = fx.db.catalog();
        let master = catalog.branch("master").await.unwrap().unwrap();
        for (name, subdir) in [("meta-one", "meta-one"), ("meta-two", "meta-two")] {
            let layer = catalog.create_layer(&NewLayer::new(name, url.as_str())).await.unwrap();
            let mut lb = catalog.ensure_layer_branch(layer.id, master.id).await.unwrap();
            lb.vcs_subdir = subdir.to_string();
            catalog.save_layer_branch(&lb).await.unwrap();
        }

        let summary = fx.run(&UpdateOptions::new("master")).await;
        assert_eq!(summary.updated, names(&["meta-one"]));
        assert_eq!(summary.failed, names(&["meta-two"]));
        let one = catalog.layer("meta-one").await.unwrap().unwrap();
        let lb = catalog.layer_branch(one.id, master.id).await.unwrap().unwrap();
        let recipes = catalog.recipes(lb.id).await.unwrap();
        assert_eq!(recipes[0].location.filepath, "recipes-a/one");
    }

    #[tokio::test]
    async fn test_removed_subdirectory_fails_established_layer() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let repo = fx.upstream("meta-multi");
        init_repo(&repo);
        write(&repo, "meta-one/conf/layer.conf", LAYER_CONF_TEXT);
        write(&repo, "meta-one/recipes-a/one/one_1.0.bb", "");
        write(&repo, "README", "");
        commit_all(&repo, "initial");
        let catalog = fx.db.catalog();
        let master = catalog.branch("master").await.unwrap().unwrap();
        let layer = catalog.create_layer(&NewLayer::new("meta-one", repo.to_string_lossy().into_owned())).await.unwrap();
        let mut lb = catalog.ensure_layer_branch(layer.id, master.id).await.unwrap();
        lb.vcs_subdir = "./meta-one/".to_string();
        catalog.save_layer_branch(&lb).await.unwrap();
        let options = UpdateOptions::new("master");
        fx.run(&options).await;

        write(&repo, "meta-one/recipes-a/two/two_1.0.bb", "");
        let head = commit_all(&repo, "add two");
        let summary = fx.run(&options).await;
        assert_eq!(summary.updated, names(&["meta-one"]));
        let lb = fx.layer_branch(&layer).await;
        assert_eq!(lb.vcs_last_rev, head);
        let recipes = catalog.recipes(lb.id).await.unwrap();
        assert_eq!(recipes.len(), 2);

        std::fs::remove_dir_all(repo.join("meta-one")).unwrap();
        commit_all(&repo, "drop meta-one");
        let summary = fx.run(&options).await;
        assert_eq!(summary.failed, names(&["meta-one"]));
        let after = fx.layer_branch(&layer).await;
        assert_eq!(after.vcs_last_rev, head);
        assert_eq!(after.vcs_last_commit, lb.vcs_last_commit);
        assert_eq!(catalog.recipes(lb.id).await.unwrap(), recipes);
    }

    #[tokio::test]
    async fn test_unknown_branch_and_empty_selection_are_fatal() {
        let db = Database::connect_in_memory().await.unwrap();
        db.catalog().create_branch(&NewBranch::new("master")).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings { fetch_dir: dir.path().join("fetch"), ..Settings::default() };
        let updater = Updater::new(settings, db, Git::with_binary("git"));

        let err = updater.run(&UpdateOptions::new("nope"), CancellationToken::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::BranchNotFound("nope".to_string()));
        let options = UpdateOptions { layers: names(&["meta-missing"]), ..UpdateOptions::new("master") };
        let err = updater.run(&options, CancellationToken::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NoLayers);
        assert!(!dir.path().join("fetch").exists());
    }

    #[tokio::test]
    async fn test_missing_toolkit_is_fatal() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        let layer = fx.add_layer("meta-foo").await;
        fx.run(&UpdateOptions::new("master")).await;
        let lb = fx.layer_branch(&layer).await;

        let toolkit_dir = fx.updater.settings.toolkit_dir();
        std::fs::remove_file(toolkit_dir.join("conf/bitbake.conf")).unwrap();
        let options = UpdateOptions { no_fetch: true, reload: true, ..UpdateOptions::new("master") };
        let err = fx.updater.run(&options, CancellationToken::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Toolkit);

        std::fs::remove_dir_all(&toolkit_dir).unwrap();
        let err = fx.updater.run(&options, CancellationToken::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Toolkit);
        assert_eq!(fx.layer_branch(&layer).await.vcs_last_fetch, lb.vcs_last_fetch);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_interrupted() {
        if !git_available() {
            return;
        }
        let fx = Fixture::new().await;
        fx.add_layer("meta-foo").await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = fx.updater.run(&UpdateOptions::new("master"), cancel).await.unwrap();
        assert!(summary.interrupted);
        assert!(summary.updated.is_empty());
    }
}

mod cli;
mod error;

use crate::cli::{BranchCommand, Cli, Command, LayerCommand, UpdateArgs};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::{OptionExt, ResultExt};
use layersync_config::Settings;
use layersync_index::Database;
use layersync_index::models::{LayerStatus, NewBranch, NewLayer};
use layersync_sync::{UpdateOptions, Updater};
use layersync_vcs::Git;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level()).with_target(false).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "{err}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(parent) = settings.database.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
    }
    let db = Database::connect(&settings.database).await.or_raise(|| ErrorKind::Database)?;
    let result = match cli.command {
        Command::Update(args) => update(settings, db.clone(), args).await,
        Command::Branch(command) => branch(&db, command).await,
        Command::Layer(command) => layer(&settings, &db, command).await,
    };
    db.close().await;
    result
}

async fn update(settings: Settings, db: Database, args: UpdateArgs) -> Result<()> {
    let git = Git::discover().or_raise(|| ErrorKind::Git)?;
    let options = UpdateOptions {
        branch: args.branch.unwrap_or_else(|| settings.default_branch.clone()),
        layers: args.layer,
        reload: args.reload,
        full_reload: args.full_reload,
        dry_run: args.dry_run,
        no_fetch: args.no_fetch,
        no_checkout: args.no_checkout,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after rolling back the current layer");
            on_interrupt.cancel();
        }
    });

    let summary = Updater::new(settings, db, git).run(&options, cancel).await.or_raise(|| ErrorKind::Update)?;
    if !summary.failed.is_empty() {
        warn!(layers = ?summary.failed, "some layers failed to update");
    }
    if summary.interrupted {
        warn!("update interrupted");
    }
    Ok(())
}

async fn branch(db: &Database, command: BranchCommand) -> Result<()> {
    match command {
        BranchCommand::Add { name, bitbake_branch, description } => {
            let new = NewBranch { name, bitbake_branch, short_description: description };
            let branch = db
                .catalog()
                .create_branch(&new)
                .await
                .or_raise(|| ErrorKind::Rejected(format!("unable to add branch {}", new.name)))?;
            info!(branch = %branch.name, "branch added");
        },
    }
    Ok(())
}

async fn layer(settings: &Settings, db: &Database, command: LayerCommand) -> Result<()> {
    match command {
        LayerCommand::Add { name, vcs_url, subdir, branch, unpublished } => {
            let catalog = db.catalog();
            let mut new = NewLayer::new(name, vcs_url);
            if unpublished {
                new.status = LayerStatus::New;
            }
            let layer = catalog
                .create_layer(&new)
                .await
                .or_raise(|| ErrorKind::Rejected(format!("unable to add layer {}", new.name)))?;
            info!(layer = %layer.name, "layer added");

            let Some(subdir) = subdir else { return Ok(()) };
            let branch_name = branch.unwrap_or_else(|| settings.default_branch.clone());
            let branch = catalog
                .branch(&branch_name)
                .await
                .or_raise(|| ErrorKind::Database)?
                .ok_or_raise(|| ErrorKind::Rejected(format!("branch not found: {branch_name}")))?;
            let mut layerbranch =
                catalog.ensure_layer_branch(layer.id, branch.id).await.or_raise(|| ErrorKind::Database)?;
            layerbranch.vcs_subdir = subdir;
            catalog.save_layer_branch(&layerbranch).await.or_raise(|| ErrorKind::Database)?;
            info!(layer = %layer.name, branch = %branch.name, subdir = %layerbranch.vcs_subdir, "subdirectory set");
        },
    }
    Ok(())
}

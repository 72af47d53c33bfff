use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Synchronise layer repository metadata into the layer index database.
#[derive(Parser, Debug)]
#[command(name = "layersync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debugging output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Hide all output except error messages
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        if self.debug {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Update the index from the layer repositories
    Update(UpdateArgs),
    /// Manage index branches
    #[command(subcommand)]
    Branch(BranchCommand),
    /// Manage layers
    #[command(subcommand)]
    Layer(LayerCommand),
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Branch to update (defaults to the configured default branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Only update these layers (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub layer: Vec<String>,

    /// Reload recipe data instead of updating since the last revision
    #[arg(short, long)]
    pub reload: bool,

    /// Discard existing recipe data and reload it from scratch
    #[arg(long = "fullreload")]
    pub full_reload: bool,

    /// Don't write any data back to the database
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Don't fetch repositories
    #[arg(short = 'x', long = "nofetch")]
    pub no_fetch: bool,

    /// Don't check out the correct branch
    #[arg(long = "nocheckout")]
    pub no_checkout: bool,
}

#[derive(Subcommand, Debug)]
pub enum BranchCommand {
    /// Register a new branch
    Add {
        name: String,
        /// Toolkit branch to parse this branch with
        #[arg(long, default_value = "master")]
        bitbake_branch: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum LayerCommand {
    /// Register a new layer
    Add {
        name: String,
        /// Repository URL to fetch the layer from
        #[arg(long)]
        vcs_url: String,
        /// Location of the layer inside the repository
        #[arg(long)]
        subdir: Option<String>,
        /// Branch the subdirectory applies to (defaults to the configured default branch)
        #[arg(long)]
        branch: Option<String>,
        /// Leave the layer out of updates unless it is named explicitly
        #[arg(long)]
        unpublished: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_update_flags() {
        let cli = Cli::parse_from(["layersync", "-d", "update", "-b", "scarthgap", "-l", "meta-a,meta-b", "-x", "--fullreload"]);
        let Command::Update(args) = &cli.command else { panic!("expected update") };
        assert_eq!(args.branch.as_deref(), Some("scarthgap"));
        assert_eq!(args.layer, vec!["meta-a", "meta-b"]);
        assert!(args.no_fetch && args.full_reload && !args.reload);
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }

    #[rstest]
    #[case(&["layersync", "update"], tracing::Level::INFO)]
    #[case(&["layersync", "-q", "update"], tracing::Level::ERROR)]
    #[case(&["layersync", "update", "--debug"], tracing::Level::DEBUG)]
    fn test_log_level(#[case] args: &[&str], #[case] expected: tracing::Level) {
        assert_eq!(Cli::parse_from(args).log_level(), expected);
    }

    #[test]
    fn test_debug_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["layersync", "-d", "-q", "update"]).is_err());
    }

    #[test]
    fn test_layer_add() {
        let cli = Cli::parse_from(["layersync", "layer", "add", "meta-foo", "--vcs-url", "git://x/meta-foo", "--subdir", "meta-foo"]);
        let Command::Layer(LayerCommand::Add { name, subdir, unpublished, .. }) = cli.command else {
            panic!("expected layer add")
        };
        assert_eq!(name, "meta-foo");
        assert_eq!(subdir.as_deref(), Some("meta-foo"));
        assert!(!unpublished);
    }
}

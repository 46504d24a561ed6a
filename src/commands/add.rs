//! # Add Command Implementation
//!
//! Declares a new repository in the configuration file. The repository type
//! is detected from the URL unless `--type` is given, and the local path
//! defaults to the repository name.

use anyhow::{Context, Result};
use clap::Args;
use repo_fleet::config::Repository;
use repo_fleet::manager::SyncManager;
use repo_fleet::output::{emoji, OutputConfig};
use repo_fleet::transport::TransportKind;

use crate::cli::GlobalArgs;
use crate::commands::load_config;

/// Add a repository to the configuration
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique repository name
    pub name: String,

    /// Git remote or downloadable file URL
    pub url: String,

    /// Repository type (git or http); detected from the URL when omitted
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: Option<TransportKind>,

    /// Local path relative to the work directory
    #[arg(long)]
    pub path: Option<String>,

    /// Track a branch
    #[arg(long, group = "selector")]
    pub branch: Option<String>,

    /// Pin a tag
    #[arg(long, group = "selector")]
    pub tag: Option<String>,

    /// Pin an exact commit
    #[arg(long, group = "selector")]
    pub commit: Option<String>,

    /// Labels for filtering (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub tags: Vec<String>,
}

impl AddArgs {
    fn into_repository(self) -> Repository {
        Repository {
            kind: self.kind,
            path: self.path,
            branch: self.branch,
            tag: self.tag,
            commit: self.commit,
            tags: self.tags,
            ..Repository::new(self.name, self.url)
        }
    }
}

/// Execute the `add` command.
pub fn execute(args: AddArgs, global: &GlobalArgs) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&global.color);
    let config = load_config(global)?;
    let mut manager = SyncManager::new(config);

    let name = args.name.clone();
    manager.add_repository(args.into_repository())?;
    manager
        .config()
        .save()
        .with_context(|| format!("Failed to save {}", global.config.display()))?;

    let added = manager
        .config()
        .get_repository(&name)
        .context("repository missing after add")?;
    println!(
        "{} Added {} ({}) -> {}",
        emoji(&out, "✅", "[OK]"),
        added.name,
        added.transport_kind(),
        added.effective_path()
    );
    println!(
        "{} Run `repo-fleet sync {}` to fetch it",
        emoji(&out, "💡", "[TIP]"),
        name
    );
    Ok(())
}

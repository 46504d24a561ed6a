//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// repo-fleet - Keep a fleet of repositories in sync
#[derive(Parser, Debug)]
#[command(name = "repo-fleet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

/// Flags shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the configuration file
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "REPO_FLEET_CONFIG",
        default_value = repo_fleet::defaults::CONFIG_FILE_NAME
    )]
    pub config: PathBuf,

    /// Override the work directory from the configuration
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<String>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new configuration file
    Init(commands::init::InitArgs),

    /// Clone or update repositories
    Sync(commands::sync::SyncArgs),

    /// Show the local state of repositories
    Status(commands::status::StatusArgs),

    /// List declared repositories, projects, and tags
    List(commands::list::ListArgs),

    /// Add a repository to the configuration
    Add(commands::add::AddArgs),

    /// Remove a repository from the configuration and the lock file
    Remove(commands::remove::RemoveArgs),

    /// Manage projects (groups of repositories)
    Project(commands::project::ProjectArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.global.log_level);

        match self.command {
            Commands::Init(args) => commands::init::execute(args, &self.global),
            Commands::Sync(args) => commands::sync::execute(args, &self.global),
            Commands::Status(args) => commands::status::execute(args, &self.global),
            Commands::List(args) => commands::list::execute(args, &self.global),
            Commands::Add(args) => commands::add::execute(args, &self.global),
            Commands::Remove(args) => commands::remove::execute(args, &self.global),
            Commands::Project(args) => commands::project::execute(args, &self.global),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

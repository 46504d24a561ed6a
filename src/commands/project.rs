//! # Project Command Implementation
//!
//! Manages projects, the named groups of repositories that `sync --project`
//! and `status --project` operate on. Only the configuration file changes:
//! removing a project or one of its members never touches repositories on
//! disk or the lock file.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use repo_fleet::config::Project;
use repo_fleet::manager::SyncManager;
use repo_fleet::output::{emoji, OutputConfig};

use crate::cli::GlobalArgs;
use crate::commands::load_config;

/// Manage projects (groups of repositories)
#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a new project
    Add {
        /// Unique project name
        name: String,

        /// Initial member repositories (comma-separated)
        #[arg(short, long, value_delimiter = ',', value_name = "REPOS")]
        repos: Vec<String>,

        /// Project labels (comma-separated)
        #[arg(short, long, value_delimiter = ',', value_name = "TAGS")]
        tags: Vec<String>,
    },

    /// Remove a project; its repositories stay declared
    #[command(visible_alias = "rm")]
    Remove {
        /// Name of the project to remove
        name: String,
    },

    /// Add a repository to a project
    AddRepo {
        /// Project to extend
        project: String,

        /// Declared repository to add
        repo: String,
    },

    /// Remove a repository from a project
    #[command(visible_alias = "rm-repo")]
    RemoveRepo {
        /// Project to shrink
        project: String,

        /// Member repository to drop
        repo: String,
    },
}

/// Applies `command` to the manager's catalog and returns the confirmation
/// lines to print.
fn apply(
    manager: &mut SyncManager,
    command: ProjectCommand,
) -> repo_fleet::error::Result<Vec<String>> {
    match command {
        ProjectCommand::Add { name, repos, tags } => {
            let mut lines = vec![format!("Created project {}", name)];
            if !repos.is_empty() {
                lines.push(format!("  Repositories: {}", repos.join(", ")));
            }
            if !tags.is_empty() {
                lines.push(format!("  Tags: {}", tags.join(", ")));
            }
            manager.add_project(Project {
                name,
                repositories: repos,
                tags,
            })?;
            Ok(lines)
        }
        ProjectCommand::Remove { name } => {
            let removed = manager.remove_project(&name)?;
            Ok(vec![format!("Removed project {}", removed.name)])
        }
        ProjectCommand::AddRepo { project, repo } => {
            manager.add_repo_to_project(&project, &repo)?;
            Ok(vec![format!("Added {} to project {}", repo, project)])
        }
        ProjectCommand::RemoveRepo { project, repo } => {
            manager.remove_repo_from_project(&project, &repo)?;
            Ok(vec![format!("Removed {} from project {}", repo, project)])
        }
    }
}

/// Execute the `project` command.
pub fn execute(args: ProjectArgs, global: &GlobalArgs) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&global.color);
    let config = load_config(global)?;
    let mut manager = SyncManager::new(config);

    let lines = apply(&mut manager, args.command)?;
    manager
        .config()
        .save()
        .with_context(|| format!("Failed to save {}", global.config.display()))?;

    let mut lines = lines.into_iter();
    if let Some(first) = lines.next() {
        println!("{} {}", emoji(&out, "✅", "[OK]"), first);
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

//! # List Command Implementation
//!
//! Prints what the catalog declares.
//!
//! - `list`: repositories and projects together
//! - `list repos`: repositories, optionally narrowed with `--project` or `--tag`
//! - `list projects`: projects with their members
//! - `list tags`: every tag used by a repository or project, with a count
//!
//! `--json` switches any of them to machine-readable output.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use repo_fleet::config::{Config, Project, Repository};
use repo_fleet::output::OutputConfig;
use serde::Serialize;

use crate::cli::GlobalArgs;
use crate::commands::load_config;

/// List declared repositories, projects, and tags
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(subcommand)]
    pub target: Option<ListTarget>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Only repositories of this project
    #[arg(short, long, global = true, value_name = "PROJECT", conflicts_with = "tag")]
    pub project: Option<String>,

    /// Only repositories carrying this tag
    #[arg(short, long, global = true, value_name = "TAG")]
    pub tag: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTarget {
    /// List repositories
    #[command(visible_alias = "repositories", alias = "r")]
    Repos,

    /// List projects
    #[command(alias = "p")]
    Projects,

    /// List tags with the number of repositories and projects using them
    #[command(alias = "t")]
    Tags,
}

#[derive(Serialize)]
struct RepositoryListing<'a> {
    name: &'a str,
    url: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    path: &'a str,
    #[serde(rename = "ref")]
    reference: String,
    tags: &'a [String],
}

#[derive(Serialize)]
struct Listing<'a> {
    repositories: Vec<RepositoryListing<'a>>,
    projects: Vec<&'a Project>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct TagCount {
    name: String,
    count: usize,
}

fn repository_listing<'a>(config: &'a Config, repos: Vec<&'a Repository>) -> Vec<RepositoryListing<'a>> {
    let default_branch = &config.general.default_branch;
    repos
        .into_iter()
        .map(|repo| RepositoryListing {
            name: &repo.name,
            url: &repo.url,
            kind: repo.transport_kind().as_str(),
            path: repo.effective_path(),
            reference: repo.effective_ref(default_branch),
            tags: &repo.tags,
        })
        .collect()
}

/// Repositories narrowed by `--project` or `--tag`.
fn selected_repositories<'a>(config: &'a Config, args: &ListArgs) -> Result<Vec<&'a Repository>> {
    Ok(match (&args.project, &args.tag) {
        (Some(project), _) => config.repositories_for_project(project)?,
        (None, Some(tag)) => config.repositories_by_tag(tag),
        (None, None) => config.repositories.iter().collect(),
    })
}

/// Tag usage across repositories and projects, sorted by tag name.
fn tag_counts(config: &Config) -> Vec<TagCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let repo_tags = config.repositories.iter().flat_map(|r| r.tags.iter());
    let project_tags = config.projects.iter().flat_map(|p| p.tags.iter());
    for tag in repo_tags.chain(project_tags) {
        *counts.entry(tag.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| TagCount {
            name: name.to_string(),
            count,
        })
        .collect()
}

/// Execute the `list` command.
pub fn execute(args: ListArgs, global: &GlobalArgs) -> Result<()> {
    // --color still governs console styling
    OutputConfig::from_env_and_flag(&global.color);
    let config = load_config(global)?;

    match args.target {
        None => {
            let listing = Listing {
                repositories: repository_listing(&config, selected_repositories(&config, &args)?),
                projects: config.projects.iter().collect(),
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_repositories(&listing.repositories);
                if !listing.projects.is_empty() {
                    println!();
                    print_projects(&listing.projects);
                }
            }
        }
        Some(ListTarget::Repos) => {
            let repos = repository_listing(&config, selected_repositories(&config, &args)?);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&repos)?);
            } else {
                print_repositories(&repos);
            }
        }
        Some(ListTarget::Projects) => {
            let projects: Vec<&Project> = config.projects.iter().collect();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("No projects declared");
            } else {
                print_projects(&projects);
            }
        }
        Some(ListTarget::Tags) => {
            let tags = tag_counts(&config);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else if tags.is_empty() {
                println!("No tags declared");
            } else {
                println!("{}", style("Tags:").bold());
                for tag in &tags {
                    println!("  {} ({})", style(&tag.name).cyan(), tag.count);
                }
            }
        }
    }
    Ok(())
}

fn print_repositories(repos: &[RepositoryListing<'_>]) {
    if repos.is_empty() {
        println!("No repositories declared");
        return;
    }

    println!("{}", style("Repositories:").bold());
    for repo in repos {
        let tags = if repo.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", repo.tags.join(", "))
        };
        println!(
            "  {} ({}) {} @ {} -> {}{}",
            style(repo.name).cyan(),
            repo.kind,
            repo.url,
            repo.reference,
            repo.path,
            tags
        );
    }
}

fn print_projects(projects: &[&Project]) {
    println!("{}", style("Projects:").bold());
    for project in projects {
        let tags = if project.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", project.tags.join(", "))
        };
        println!(
            "  {}: {}{}",
            style(&project.name).cyan(),
            project.repositories.join(", "),
            tags
        );
    }
}

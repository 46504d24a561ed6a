//! # Status Command Implementation
//!
//! Shows the local state of repositories without touching them: whether each
//! one exists on disk, what it currently resolves to, what the lock recorded,
//! and whether a sync would change it.
//!
//! ## Output Formats
//!
//! - Human-readable table (default)
//! - `--json`: an array of status objects
//! - `--porcelain`: one tab-separated line per repository for scripts

use anyhow::Result;
use clap::Args;
use console::style;
use repo_fleet::manager::{Filter, RepoStatus, SyncManager};
use repo_fleet::output::{emoji, OutputConfig};
use repo_fleet::transport::short_ref;

use crate::cli::GlobalArgs;
use crate::commands::{load_config, load_lock};

/// Show the local state of repositories
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Repositories to inspect (default: all)
    #[arg(value_name = "NAME", conflicts_with = "project")]
    pub names: Vec<String>,

    /// Inspect every repository of a project
    #[arg(short, long, value_name = "PROJECT")]
    pub project: Vec<String>,

    /// Output as JSON
    #[arg(long, conflicts_with = "porcelain")]
    pub json: bool,

    /// Output one machine-readable line per repository
    #[arg(long)]
    pub porcelain: bool,
}

/// Execute the `status` command.
pub fn execute(args: StatusArgs, global: &GlobalArgs) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&global.color);
    let config = load_config(global)?;
    let lock = load_lock(&config)?;
    let manager = SyncManager::new(config).with_lock_store(Box::new(lock));

    let filter = if args.project.is_empty() {
        Filter::names(args.names)
    } else {
        Filter {
            projects: args.project,
            ..Filter::default()
        }
    };
    let statuses = manager.status(&filter)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else if args.porcelain {
        for status in &statuses {
            println!("{}", porcelain_line(status));
        }
    } else {
        print_table(&statuses, &out);
    }
    Ok(())
}

/// `<state>\t<name>\t<current>\t<locked>\t<path>`, with `-` for unknown refs.
fn porcelain_line(status: &RepoStatus) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        state(status),
        status.name,
        status.current_ref.as_deref().unwrap_or("-"),
        status.locked_ref.as_deref().unwrap_or("-"),
        status.path.display()
    )
}

fn state(status: &RepoStatus) -> &'static str {
    if !status.exists {
        "missing"
    } else if status.error.is_some() {
        "error"
    } else if status.is_dirty {
        "dirty"
    } else if status.needs_update {
        "outdated"
    } else {
        "ok"
    }
}

fn print_table(statuses: &[RepoStatus], out: &OutputConfig) {
    if statuses.is_empty() {
        println!("No repositories declared");
        return;
    }

    let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for status in statuses {
        let marker = match state(status) {
            "ok" => emoji(out, "✅", "[OK]"),
            "missing" => emoji(out, "➖", "[--]"),
            "error" => emoji(out, "❌", "[ERR]"),
            _ => emoji(out, "⚠️", "[!!]"),
        };
        let current = status.current_ref.as_deref().map(short_ref).unwrap_or("-");
        let mut line = format!(
            "{} {:<width$}  {:<7} {:<12} {}",
            marker,
            status.name,
            status.kind.as_str(),
            current,
            state(status),
            width = width
        );
        if let Some(branch) = &status.branch {
            line.push_str(&format!(" [{}]", branch));
        }
        println!("{}", line);
        if let Some(error) = &status.error {
            println!("    {}", style(error).red());
        }
    }
}

//! # Sync Command Implementation
//!
//! Clones or updates the selected repositories and records what each one
//! resolved to in `.repo-fleet.lock`.
//!
//! ## Selection
//!
//! Repositories are picked by name, `--project`, or `--tag`; with none of
//! them every declared repository is synced. Only one kind of selector may
//! be given per invocation, though it may be repeated.
//!
//! ## Modes
//!
//! - **Default**: move every repository to its requested reference and
//!   rewrite the lock entries of the successful ones.
//! - **`--locked`**: reproduce the references already in the lock. A missing
//!   entry or a different resolved reference fails that repository, and the
//!   lock file is left untouched.
//! - **`--dry-run`**: report what would change without touching anything.
//!
//! The command exits with status 1 when any repository failed.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use repo_fleet::manager::{format_duration, Filter, RepoStatus, SyncManager};
use repo_fleet::output::{emoji, is_interactive, BarRenderer, LineRenderer, OutputConfig};
use repo_fleet::progress::{ChannelSink, NullSink, ProgressSink};
use repo_fleet::report::SyncReport;

use crate::cli::GlobalArgs;
use crate::commands::{load_config, load_lock, lock_path};

/// Clone or update repositories
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Repositories to sync (default: all)
    #[arg(value_name = "NAME", conflicts_with_all = ["project", "tag"])]
    pub names: Vec<String>,

    /// Sync every repository of a project
    #[arg(short, long, value_name = "PROJECT", conflicts_with = "tag")]
    pub project: Vec<String>,

    /// Sync every repository carrying a tag
    #[arg(short, long, value_name = "TAG")]
    pub tag: Vec<String>,

    /// Reproduce the references recorded in the lock file
    #[arg(long)]
    pub locked: bool,

    /// Maximum number of repositories synced at once
    #[arg(
        short = 'j',
        long,
        value_name = "N",
        default_value_t = repo_fleet::defaults::CONCURRENCY
    )]
    pub parallel: usize,

    /// Show what would be synced without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    /// Names win over projects, projects over tags.
    fn filter(&self) -> Filter {
        if !self.names.is_empty() {
            Filter::names(self.names.iter().cloned())
        } else if !self.project.is_empty() {
            Filter {
                projects: self.project.clone(),
                ..Filter::default()
            }
        } else if !self.tag.is_empty() {
            Filter {
                tags: self.tag.clone(),
                ..Filter::default()
            }
        } else {
            Filter::all()
        }
    }
}

/// Execute the `sync` command.
pub fn execute(args: SyncArgs, global: &GlobalArgs) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&global.color);
    let config = load_config(global)?;
    let lock = load_lock(&config)?;
    let lock_file = lock_path(&config);
    let filter = args.filter();

    let progress: Arc<dyn ProgressSink> = if global.quiet || args.dry_run {
        Arc::new(NullSink)
    } else if is_interactive() {
        Arc::new(ChannelSink::spawn(BarRenderer::new(out.clone())))
    } else {
        Arc::new(ChannelSink::spawn(LineRenderer::stderr(out.clone())))
    };

    let mut manager = SyncManager::new(config)
        .with_lock_store(Box::new(lock))
        .with_concurrency(args.parallel)
        .with_locked(args.locked)
        .with_progress(progress);

    if args.dry_run {
        let statuses = manager.status(&filter)?;
        print_plan(&statuses, &out);
        return Ok(());
    }

    let report = manager.sync(&filter)?;

    if !args.locked && report.succeeded() > 0 {
        manager
            .persist_lock(&lock_file)
            .with_context(|| format!("Failed to write {}", lock_file.display()))?;
        log::debug!("lock written to {}", lock_file.display());
    }

    print_report(&report, &out);

    if report.has_failures() {
        anyhow::bail!(
            "{} of {} repositories failed to sync",
            report.failed(),
            report.total()
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport, out: &OutputConfig) {
    if report.total() == 0 {
        println!("{} No repositories selected", emoji(out, "ℹ️", "[INFO]"));
        return;
    }

    for result in report.results() {
        if result.is_success() {
            println!(
                "{} {} {} ({})",
                emoji(out, "✅", "[OK]"),
                style(result.name()).bold(),
                result.short_ref(),
                format_duration(result.duration())
            );
        } else {
            let reason = result.error().map(ToString::to_string).unwrap_or_default();
            println!(
                "{} {} {}",
                emoji(out, "❌", "[FAIL]"),
                style(result.name()).bold(),
                style(reason).red()
            );
        }
    }

    println!();
    println!(
        "Synced {}/{} repositories in {}",
        report.succeeded(),
        report.total(),
        format_duration(report.duration())
    );
}

fn print_plan(statuses: &[RepoStatus], out: &OutputConfig) {
    if statuses.is_empty() {
        println!("{} No repositories selected", emoji(out, "ℹ️", "[INFO]"));
        return;
    }

    let mut pending = 0;
    for status in statuses {
        let action = if !status.exists {
            "clone"
        } else if status.needs_update {
            "update"
        } else {
            "up to date"
        };
        if status.needs_update {
            pending += 1;
        }
        println!(
            "{} {} {} ({})",
            emoji(out, "🔍", "[DRY]"),
            style(&status.name).bold(),
            action,
            status.requested_ref
        );
    }

    println!();
    println!(
        "{} of {} repositories would be synced",
        pending,
        statuses.len()
    );
}

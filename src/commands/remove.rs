//! # Remove Command Implementation
//!
//! Removes a repository from the configuration, from every project that
//! lists it, and from the lock file. Files already on disk are left alone.

use anyhow::{Context, Result};
use clap::Args;
use repo_fleet::lockfile::LockStore;
use repo_fleet::manager::SyncManager;
use repo_fleet::output::{emoji, OutputConfig};

use crate::cli::GlobalArgs;
use crate::commands::{load_config, load_lock, lock_path};

/// Remove a repository from the configuration and the lock file
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Name of the repository to remove
    pub name: String,
}

/// Execute the `remove` command.
pub fn execute(args: RemoveArgs, global: &GlobalArgs) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&global.color);
    let config = load_config(global)?;
    let lock = load_lock(&config)?;
    let lock_file = lock_path(&config);
    let had_lock_entry = lock.has(&args.name);

    let mut manager = SyncManager::new(config).with_lock_store(Box::new(lock));
    let removed = manager.remove_repository(&args.name)?;

    manager
        .config()
        .save()
        .with_context(|| format!("Failed to save {}", global.config.display()))?;
    if had_lock_entry {
        manager
            .persist_lock(&lock_file)
            .with_context(|| format!("Failed to write {}", lock_file.display()))?;
    }

    println!(
        "{} Removed {} (files under {} were kept)",
        emoji(&out, "✅", "[OK]"),
        removed.name,
        manager
            .config()
            .work_dir()
            .join(removed.effective_path())
            .display()
    );
    Ok(())
}

//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `repo-fleet` command-line tool, one file per subcommand.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and the global flags
//!   and performs the command's logic by calling into the `repo_fleet` library.
//!
//! Commands that need the catalog share [`load_config`] and [`load_lock`], so
//! every command resolves the configuration file, the `--work-dir` override,
//! and the lock file location the same way.

pub mod add;
pub mod completions;
pub mod init;
pub mod list;
pub mod project;
pub mod remove;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use repo_fleet::config::Config;
use repo_fleet::defaults;
use repo_fleet::lockfile::LockFile;

use crate::cli::GlobalArgs;

/// Loads the configuration named by `--config`, applying `--work-dir`.
pub fn load_config(global: &GlobalArgs) -> Result<Config> {
    if !global.config.exists() {
        anyhow::bail!(
            "Configuration file not found: {}\n  hint: run `repo-fleet init` to create one",
            global.config.display()
        );
    }

    let mut config = Config::load(&global.config)
        .with_context(|| format!("Failed to load {}", global.config.display()))?;

    if let Some(work_dir) = &global.work_dir {
        config
            .set_work_dir(work_dir)
            .with_context(|| format!("Invalid work directory: {}", work_dir))?;
    }

    log::debug!("work directory: {}", config.work_dir().display());
    Ok(config)
}

/// The lock file sits next to the configuration file.
pub fn lock_path(config: &Config) -> PathBuf {
    config.dir().join(defaults::LOCK_FILE_NAME)
}

pub fn load_lock(config: &Config) -> Result<LockFile> {
    let path = lock_path(config);
    LockFile::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

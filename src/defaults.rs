//! Default values for repo-fleet configuration.
//!
//! This module provides centralized default values used by the configuration
//! loader and the CLI, ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".repo-fleet.toml";

/// Name of the lock file written next to the configuration file.
pub const LOCK_FILE_NAME: &str = ".repo-fleet.lock";

/// Per-repository deadline for a sync operation.
pub const TIMEOUT_SECS: u64 = 600;

/// Branch tracked when a repository requests no branch, tag, or commit.
pub const DEFAULT_BRANCH: &str = "main";

/// Depth used for shallow clones.
pub const CLONE_DEPTH: u32 = 1;

/// Number of retries for plain-file downloads (total attempts = retries + 1).
pub const RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between download attempts.
pub const RETRY_DELAY_MS: u64 = 2000;

/// Default number of repositories synchronized at the same time.
pub const CONCURRENCY: usize = 4;

/// User agent sent with plain-file downloads.
pub fn user_agent() -> String {
    format!("repo-fleet/{}", env!("CARGO_PKG_VERSION"))
}

/// Returns the default configuration path in the current directory.
///
/// This can be overridden by the `--config` CLI flag or the
/// `REPO_FLEET_CONFIG` environment variable.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version() {
        let ua = user_agent();
        assert!(ua.starts_with("repo-fleet/"));
        assert!(ua.ends_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_default_config_path_is_relative_file_name() {
        assert_eq!(default_config_path(), PathBuf::from(".repo-fleet.toml"));
    }
}

//! # Init Command Implementation
//!
//! Creates a new `.repo-fleet.toml` with commented examples, or an empty
//! catalog with `--empty`. An existing file is only replaced with `--force`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use repo_fleet::config::Config;
use repo_fleet::output::{emoji, OutputConfig};

use crate::cli::GlobalArgs;

/// Create a new .repo-fleet.toml configuration file
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Create a configuration without example repositories
    #[arg(long)]
    pub empty: bool,

    /// Overwrite an existing configuration file
    #[arg(short, long)]
    pub force: bool,
}

/// Execute the `init` command.
pub fn execute(args: InitArgs, global: &GlobalArgs) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(&global.color);
    let path = global.config.as_path();

    if path.exists() && !args.force {
        anyhow::bail!(
            "Configuration file '{}' already exists. Use --force to overwrite.",
            path.display()
        );
    }

    let content = if args.empty {
        generate_empty_config()
    } else {
        generate_example_config()
    };

    write_config(path, &content)?;

    println!("{} Created {}", emoji(&out, "✅", "[OK]"), path.display());
    println!(
        "{} Run `repo-fleet add <name> <url>` to declare repositories, then `repo-fleet sync`",
        emoji(&out, "💡", "[TIP]")
    );
    Ok(())
}

fn write_config(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn generate_empty_config() -> String {
    let config = Config::default();
    let body = toml::to_string_pretty(&config).unwrap_or_default();
    format!("# repo-fleet configuration\n\n{}", body)
}

fn generate_example_config() -> String {
    r#"# repo-fleet configuration
#
# Each [[repository]] is cloned (git) or downloaded (http) into
# <work_dir>/<path>. Resolved references are recorded in .repo-fleet.lock.

[general]
work_dir = "."
timeout_secs = 600
default_branch = "main"
recurse_submodules = false

[http]
retry_attempts = 3
retry_delay_ms = 2000

[git]
shallow_clone = true
clone_depth = 1

# [[repository]]
# name = "api"
# url = "https://github.com/acme/api.git"
# branch = "develop"
# tags = ["backend"]
#
# [[repository]]
# name = "schema"
# url = "https://downloads.acme.dev/schema/v2.json"
# path = "vendor/schema.json"
#
# [[project]]
# name = "platform"
# repositories = ["api", "schema"]
"#
    .to_string()
}

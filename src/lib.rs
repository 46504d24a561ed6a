//! # repo-fleet Library
//!
//! This library keeps a declared fleet of external repositories (Git
//! repositories and plain downloadable files) synchronized with the references
//! they ask for, and records exactly what each one resolved to so a later run
//! can reproduce it. It backs the `repo-fleet` command-line tool but can be
//! embedded in other applications.
//!
//! ## Quick Example
//!
//! ```
//! use std::path::Path;
//! use repo_fleet::config::Config;
//! use repo_fleet::manager::{resolve_repositories, Filter};
//!
//! let config = Config::parse(
//!     r#"
//! [[repository]]
//! name = "api"
//! url = "https://github.com/acme/api.git"
//! tags = ["backend"]
//!
//! [[repository]]
//! name = "schema"
//! url = "https://downloads.acme.dev/schema.json"
//! "#,
//!     Path::new("/workspace"),
//! )
//! .unwrap();
//!
//! let backend = resolve_repositories(&Filter::tag("backend"), &config).unwrap();
//! assert_eq!(backend.len(), 1);
//! assert_eq!(backend[0].effective_ref(&config.general.default_branch), "main");
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: The `.repo-fleet.toml` catalog of
//!   repositories and projects, plus global defaults.
//! - **Transports (`transport`)**: Backends that clone or download a repository,
//!   update it, and report its resolved reference (`git` and `http`).
//! - **Progress (`progress`)**: Ordered per-repository phase events. A sink may
//!   drop intermediate events but always receives each outcome.
//! - **Lock (`lockfile`)**: The resolved reference of every successfully synced
//!   repository, in `.repo-fleet.lock`.
//! - **Orchestration (`manager`)**: Resolves a filter, syncs under a
//!   concurrency bound, and updates the lock.
//!
//! ## Execution Flow
//!
//! 1.  **Resolve**: Expand names, projects, and tags into a repository set.
//! 2.  **Sync**: Clone or update each repository in parallel, streaming progress.
//! 3.  **Report**: Collect one result per repository, in input order.
//! 4.  **Lock**: Record resolved references of the successful repositories.

pub mod config;
pub mod defaults;
pub mod error;
pub mod lockfile;
pub mod manager;
pub mod output;
pub mod progress;
pub mod report;
pub mod transport;

#[cfg(test)]
mod manager_proptest;

//! # Error Handling
//!
//! This module defines the centralized error type for `repo-fleet`. It uses
//! `thiserror` to build a single `Error` enum whose variants carry enough
//! context (repository name, URL, reference) to be printed directly to the
//! user.
//!
//! Errors fall into a few families, and the family decides how far an error
//! travels:
//!
//! - **Selection errors** (`RepositoryNotFound`, `ProjectNotFound`,
//!   `TagNotFound`) and **local filesystem errors** (`WorkDir`) abort a whole
//!   batch before any repository is touched. They are returned as `Err` from
//!   `SyncManager::sync`.
//! - **Transport errors** (`GitClone`, `GitCommand`, `Http`,
//!   `DownloadExhausted`, `Transport`, `Cancelled`, `Timeout`) and
//!   **lock-consistency errors** (`MissingLockEntry`, `LockMismatch`) are
//!   scoped to one repository. They are captured in that repository's
//!   `OperationResult` and never abort its siblings.
//! - **Configuration errors** (`ConfigParse`, `Validation`, duplicates) come
//!   from loading or editing `.repo-fleet.toml`.

use std::time::Duration;

use thiserror::Error;

/// Main error type for repo-fleet operations
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration file could not be parsed.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A configuration value failed validation.
    #[error("Invalid configuration at {field}: {message}")]
    Validation { field: String, message: String },

    /// A repository with this name is already declared.
    #[error("Repository already exists: {name}")]
    DuplicateRepository { name: String },

    /// A project with this name is already declared.
    #[error("Project already exists: {name}")]
    DuplicateProject { name: String },

    /// A named repository is not declared in the configuration.
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    /// A named project is not declared in the configuration.
    #[error("Project not found: {name}")]
    ProjectNotFound { name: String },

    /// The repository is already a member of the project.
    #[error("Repository {repo} is already in project {project}")]
    AlreadyInProject { repo: String, project: String },

    /// The repository is not a member of the project.
    #[error("Repository {repo} is not in project {project}")]
    NotInProject { repo: String, project: String },

    /// No declared repository carries this tag.
    #[error("No repository is tagged '{tag}'")]
    TagNotFound { tag: String },

    /// The requested concurrency bound is unusable.
    #[error("Concurrency limit must be at least 1 (got {requested})")]
    InvalidConcurrency { requested: usize },

    /// The shared working directory could not be created.
    #[error("Failed to create work directory {path}: {source}")]
    WorkDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Cloning a Git repository failed.
    #[error("Git clone error for {url}@{r#ref}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    GitClone {
        url: String,
        r#ref: String,
        message: String,
        /// Optional hint for how to resolve the clone issue
        hint: Option<String>,
    },

    /// A Git command other than clone failed.
    #[error("Git command failed in {location}: {command} - {stderr}")]
    GitCommand {
        command: String,
        location: String,
        stderr: String,
    },

    /// A single HTTP download attempt failed.
    #[error("HTTP download error for {url}: {message}")]
    Http { url: String, message: String },

    /// Every HTTP download attempt failed; carries the last observed error.
    #[error("Download of {url} failed after {attempts} attempts: {last}")]
    DownloadExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    /// A transport reported failure without a more specific error.
    #[error("Transport for {name} failed: {message}")]
    Transport { name: String, message: String },

    /// In-flight transport work was stopped through its cancel token.
    #[error("Transfer from {url} was cancelled")]
    Cancelled { url: String },

    /// The repository did not finish within its per-operation deadline.
    #[error("Sync of {name} timed out after {}s", after.as_secs())]
    Timeout { name: String, after: Duration },

    /// Locked mode was requested but the lock has no entry for the repository.
    #[error("No lock entry for {name} (run sync without --locked first)")]
    MissingLockEntry { name: String },

    /// Locked mode resolved to a different reference than the one recorded.
    #[error("Locked reference mismatch for {name}: expected {expected}, got {actual}")]
    LockMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The transport kind named in the configuration is not supported.
    #[error("Unknown repository type: {kind} (must be 'git' or 'http')")]
    UnknownTransport { kind: String },

    /// The worker pool for a sync batch could not be created.
    #[error("Failed to start worker pool: {message}")]
    ThreadPool { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A TOML parsing error, wrapped from `toml::de::Error`.
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A TOML serialization error, wrapped from `toml::ser::Error`.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Returns true for errors that fail a whole batch rather than a single
    /// repository.
    pub fn is_batch_error(&self) -> bool {
        matches!(
            self,
            Error::RepositoryNotFound { .. }
                | Error::ProjectNotFound { .. }
                | Error::TagNotFound { .. }
                | Error::InvalidConcurrency { .. }
                | Error::WorkDir { .. }
                | Error::ThreadPool { .. }
        )
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

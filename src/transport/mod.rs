//! # Transport Backends
//!
//! A transport knows how to materialize one repository descriptor on disk,
//! bring an existing copy up to date, and report the canonical *resolved
//! reference* of what is on disk. Two backends exist:
//!
//! - **`git`** ([`git::GitTransport`]): drives the system `git` binary. The
//!   resolved reference is the `HEAD` commit id.
//! - **`http`** ([`http::HttpTransport`]): downloads a single file over
//!   HTTP(S) with retries. The resolved reference is the SHA-256 of the
//!   downloaded bytes.
//!
//! ## Design
//!
//! The orchestrator only ever talks to the [`Transport`] trait and picks a
//! backend through a [`TransportProvider`], selected by [`TransportKind`].
//! Transports hold no per-repository state: the source URL is passed to every
//! call, including updates, so a transport instance can be reused across
//! repositories.
//!
//! The `*_with_progress` calls return a [`ProgressStream`] immediately and do
//! their work on a background thread. The stream closes exactly once, after a
//! final `complete` or `failed` update (see [`crate::progress::ProgressEmitter`]).
//!
//! Background work polls the [`CancelToken`] in its options. Once it is
//! cancelled a transport stops as soon as it can (killing a running `git`,
//! abandoning a download between chunks) and finishes with
//! [`Error::Cancelled`].

pub mod git;
pub mod http;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{Config, Repository};
use crate::error::{Error, Result};
use crate::lockfile::SubmoduleLock;
use crate::progress::ProgressStream;

/// The kind of backend used to synchronize a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Git,
    Http,
}

impl TransportKind {
    /// Stable identifier used in configuration and lock entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Git => "git",
            TransportKind::Http => "http",
        }
    }

    /// Guesses the transport kind from a source URL.
    ///
    /// SSH-style and `.git` URLs, and URLs on well-known forges, are Git.
    /// Any other `http(s)://` URL is a plain download. Everything else
    /// falls back to Git.
    pub fn detect(url: &str) -> Self {
        const FORGES: [&str; 3] = ["github.com", "gitlab.com", "bitbucket.org"];

        if url.starts_with("git@")
            || url.starts_with("git://")
            || url.ends_with(".git")
            || FORGES.iter().any(|forge| url.contains(forge))
        {
            return TransportKind::Git;
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return TransportKind::Http;
        }

        TransportKind::Git
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "git" => Ok(TransportKind::Git),
            "http" => Ok(TransportKind::Http),
            other => Err(Error::UnknownTransport {
                kind: other.to_string(),
            }),
        }
    }
}

/// The reference a repository should be synchronized to.
///
/// Built with a fixed priority: an exact commit wins over a tag, a tag wins
/// over a branch, and with none of them the configured default branch is
/// tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Commit(String),
    Tag(String),
    Branch(String),
    DefaultBranch(String),
}

impl RefTarget {
    /// Picks the target from optional selectors using commit > tag > branch.
    pub fn select(
        commit: Option<&str>,
        tag: Option<&str>,
        branch: Option<&str>,
        default_branch: &str,
    ) -> Self {
        let non_empty = |s: Option<&str>| s.filter(|v| !v.is_empty()).map(str::to_string);

        if let Some(commit) = non_empty(commit) {
            RefTarget::Commit(commit)
        } else if let Some(tag) = non_empty(tag) {
            RefTarget::Tag(tag)
        } else if let Some(branch) = non_empty(branch) {
            RefTarget::Branch(branch)
        } else {
            RefTarget::DefaultBranch(default_branch.to_string())
        }
    }

    /// The requested reference string as recorded in the lock file.
    pub fn as_str(&self) -> &str {
        match self {
            RefTarget::Commit(r)
            | RefTarget::Tag(r)
            | RefTarget::Branch(r)
            | RefTarget::DefaultBranch(r) => r,
        }
    }

    /// True when the target needs an explicit checkout after clone or fetch,
    /// i.e. it is narrower than "whatever the branch head is".
    pub fn needs_checkout(&self) -> bool {
        matches!(self, RefTarget::Commit(_) | RefTarget::Tag(_))
    }
}

/// Interval at which background work checks for cancellation.
pub const CANCEL_POLL: Duration = Duration::from_millis(50);

/// A shared flag asking in-flight transport work to stop.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early on cancellation.
    ///
    /// Returns true if the token was cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= until {
                return false;
            }
            std::thread::sleep(CANCEL_POLL.min(until - now));
        }
    }
}

/// Per-repository transport settings, resolved from the repository's
/// overrides and the global configuration.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub target: RefTarget,
    pub shallow: bool,
    pub depth: u32,
    pub submodules: bool,
    pub user_agent: String,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub cancel: CancelToken,
}

impl TransportOptions {
    /// Resolves the options for `repo` under `config`.
    pub fn for_repository(repo: &Repository, config: &Config) -> Self {
        Self {
            target: repo.ref_target(&config.general.default_branch),
            shallow: repo.is_shallow(config.git.shallow_clone),
            depth: repo.clone_depth(config.git.clone_depth),
            submodules: repo.recurse_submodules(config.general.recurse_submodules),
            user_agent: config.http.user_agent.clone(),
            retry_attempts: config.http.retry_attempts,
            retry_delay: config.http.retry_delay(),
            timeout: config.general.timeout(),
            cancel: CancelToken::new(),
        }
    }

    /// Pins the options to an exact revision, overriding any tag or branch.
    pub fn pinned_to(mut self, revision: &str) -> Self {
        self.target = RefTarget::Commit(revision.to_string());
        self
    }

    /// Shares `cancel` with the transport built from these options.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        let config = Config::default();
        Self {
            target: RefTarget::DefaultBranch(config.general.default_branch.clone()),
            shallow: config.git.shallow_clone,
            depth: config.git.clone_depth,
            submodules: config.general.recurse_submodules,
            user_agent: config.http.user_agent.clone(),
            retry_attempts: config.http.retry_attempts,
            retry_delay: config.http.retry_delay(),
            timeout: config.general.timeout(),
            cancel: CancelToken::new(),
        }
    }
}

/// The capability every backend implements.
pub trait Transport: Send + Sync {
    /// Materializes a new local copy of `source` at `destination`, creating
    /// parent directories. Returns the resolved reference.
    fn fetch_new(&self, source: &str, destination: &Path) -> Result<String>;

    /// Like [`Transport::fetch_new`], reporting progress on the returned
    /// stream. The final update carries the resolved reference.
    fn fetch_new_with_progress(&self, source: &str, destination: &Path) -> Result<ProgressStream>;

    /// Brings an existing copy at `destination` up to the configured target.
    fn update_existing(&self, source: &str, destination: &Path) -> Result<String>;

    /// Like [`Transport::update_existing`], reporting progress.
    fn update_existing_with_progress(
        &self,
        source: &str,
        destination: &Path,
    ) -> Result<ProgressStream>;

    /// Computes the resolved reference of `destination` without modifying it.
    fn current_resolved_ref(&self, destination: &Path) -> Result<String>;

    /// Locks for nested submodules of `destination`, if the backend has any.
    fn submodule_locks(&self, _destination: &Path) -> Result<Vec<SubmoduleLock>> {
        Ok(Vec::new())
    }

    /// The backend's kind, used for dispatch and lock entries.
    fn kind(&self) -> TransportKind;
}

/// Creates transports for the orchestrator.
///
/// This is the seam tests use to inject instrumented transports.
pub trait TransportProvider: Send + Sync {
    fn create(&self, kind: TransportKind, options: TransportOptions) -> Result<Box<dyn Transport>>;
}

/// Builds the real Git or HTTP backend for a kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportProvider;

impl TransportProvider for DefaultTransportProvider {
    fn create(&self, kind: TransportKind, options: TransportOptions) -> Result<Box<dyn Transport>> {
        Ok(match kind {
            TransportKind::Git => Box::new(git::GitTransport::new(options)),
            TransportKind::Http => Box::new(http::HttpTransport::new(options)),
        })
    }
}

/// Returns true if something already exists at `path`.
pub fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Shortens a resolved reference for display (first 8 characters).
pub fn short_ref(reference: &str) -> &str {
    reference
        .char_indices()
        .nth(8)
        .map(|(idx, _)| &reference[..idx])
        .unwrap_or(reference)
}

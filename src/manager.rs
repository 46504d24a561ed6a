//! # Sync Orchestration
//!
//! The `SyncManager` turns a [`Filter`] into a set of declared repositories,
//! synchronizes them in parallel under a fixed concurrency bound, and records
//! the resolved references of the successful ones in a [`LockStore`].
//!
//! ## Execution Flow
//!
//! 1. **Resolve**: [`resolve_repositories`] expands names, projects, and tags
//!    into a set of repositories in catalog order. Unknown names, projects, or
//!    tags fail the whole call before anything is touched.
//! 2. **Prepare**: the shared work directory is created.
//! 3. **Fan out**: a rayon pool with exactly `concurrency` threads runs one task
//!    per repository. A task never cancels or waits on another, and results
//!    are collected by input position, so the report keeps input order.
//! 4. **Record**: once every task has joined, successful results are written
//!    to the lock store. Failed results and locked runs never write.
//!
//! ## Per-repository task
//!
//! `init` is reported, then in locked mode the recorded reference is looked up
//! and the transport is pinned to it. The transport clones or updates with
//! progress; the first update carrying an error fails the task. If the stream
//! closes without a resolved reference the transport is asked for one. In
//! locked mode the result must equal the recorded reference. A terminal
//! `complete` or `failed` event is always the last event for the repository.
//!
//! Each task has a deadline of `general.timeout_secs` (zero disables it). On
//! expiry the transport's [`CancelToken`] is fired and the task keeps its pool
//! thread until the transport's stream closes, then fails with
//! [`Error::Timeout`]. A timed-out transfer therefore still counts against the
//! concurrency bound until it has actually stopped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam::channel::RecvTimeoutError;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{Config, Project, Repository};
use crate::defaults;
use crate::error::{Error, Result};
use crate::lockfile::{LockEntry, LockFile, LockStore, SubmoduleLock};
use crate::progress::{NullSink, Phase, ProgressEvent, ProgressSink, ProgressStream};
use crate::report::{OperationResult, SyncReport};
use crate::transport::{
    self, git, CancelToken, DefaultTransportProvider, TransportKind, TransportOptions,
    TransportProvider,
};

/// Selects which repositories an operation applies to.
///
/// Names, projects, and tags are unioned. An empty filter, or `all`, selects
/// the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub names: Vec<String>,
    pub projects: Vec<String>,
    pub tags: Vec<String>,
    pub all: bool,
}

impl Filter {
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn project(name: impl Into<String>) -> Self {
        Self {
            projects: vec![name.into()],
            ..Self::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tags: vec![tag.into()],
            ..Self::default()
        }
    }

    /// True if the filter selects the whole catalog.
    pub fn selects_all(&self) -> bool {
        self.all || (self.names.is_empty() && self.projects.is_empty() && self.tags.is_empty())
    }
}

/// Expands `filter` against the catalog in `config`.
///
/// The result is a set: a repository reached through several names, projects,
/// or tags appears once, in the order it is declared in the catalog.
pub fn resolve_repositories<'a>(filter: &Filter, config: &'a Config) -> Result<Vec<&'a Repository>> {
    if filter.selects_all() {
        return Ok(config.repositories.iter().collect());
    }

    let mut selected: HashSet<&str> = HashSet::new();

    for name in &filter.names {
        let repo = config
            .get_repository(name)
            .ok_or_else(|| Error::RepositoryNotFound { name: name.clone() })?;
        selected.insert(repo.name.as_str());
    }

    for project in &filter.projects {
        for repo in config.repositories_for_project(project)? {
            selected.insert(repo.name.as_str());
        }
    }

    for tag in &filter.tags {
        let tagged = config.repositories_by_tag(tag);
        if tagged.is_empty() {
            return Err(Error::TagNotFound { tag: tag.clone() });
        }
        selected.extend(tagged.iter().map(|r| r.name.as_str()));
    }

    Ok(config
        .repositories
        .iter()
        .filter(|r| selected.contains(r.name.as_str()))
        .collect())
}

/// Read-only view of one repository's local state.
#[derive(Debug, Clone, Serialize)]
pub struct RepoStatus {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: TransportKind,
    pub exists: bool,
    pub current_ref: Option<String>,
    pub locked_ref: Option<String>,
    pub requested_ref: String,
    pub branch: Option<String>,
    pub is_dirty: bool,
    pub needs_update: bool,
    pub error: Option<String>,
}

/// Coordinates syncing, status, and catalog edits for a configuration.
pub struct SyncManager {
    config: Config,
    lock: Box<dyn LockStore>,
    concurrency: usize,
    locked: bool,
    progress: Arc<dyn ProgressSink>,
    provider: Box<dyn TransportProvider>,
}

impl SyncManager {
    /// Creates a manager with an empty in-memory lock, the default concurrency,
    /// no progress output, and the real transports.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            lock: Box::new(LockFile::new()),
            concurrency: defaults::CONCURRENCY,
            locked: false,
            progress: Arc::new(NullSink),
            provider: Box::new(DefaultTransportProvider),
        }
    }

    pub fn with_lock_store(mut self, lock: Box<dyn LockStore>) -> Self {
        self.lock = lock;
        self
    }

    /// Maximum number of repositories synchronized at once. Must be at least 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Reproduce the references recorded in the lock instead of moving forward.
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_transport_provider(mut self, provider: Box<dyn TransportProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn lock_store(&self) -> &dyn LockStore {
        self.lock.as_ref()
    }

    pub fn lock_store_mut(&mut self) -> &mut dyn LockStore {
        self.lock.as_mut()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Writes the lock store to `path`.
    pub fn persist_lock(&mut self, path: &std::path::Path) -> Result<()> {
        self.lock.persist(path)
    }

    /// Synchronizes every repository selected by `filter`.
    ///
    /// Returns `Err` only for problems that stop the whole batch: an invalid
    /// concurrency bound, an unresolvable filter, or an unusable work
    /// directory. Per-repository failures are reported in the [`SyncReport`].
    pub fn sync(&mut self, filter: &Filter) -> Result<SyncReport> {
        let start = Instant::now();

        if self.concurrency == 0 {
            return Err(Error::InvalidConcurrency {
                requested: self.concurrency,
            });
        }

        let repos: Vec<Repository> = resolve_repositories(filter, &self.config)?
            .into_iter()
            .cloned()
            .collect();

        if repos.is_empty() {
            log::info!("no repositories selected");
            let elapsed = start.elapsed();
            self.progress.complete(elapsed);
            return Ok(SyncReport::new(Vec::new(), elapsed));
        }

        self.ensure_work_dir()?;

        log::info!(
            "syncing {} repositories with concurrency {}{}",
            repos.len(),
            self.concurrency,
            if self.locked { " (locked)" } else { "" }
        );

        let results = self.sync_all(&repos)?;
        self.record(&repos, &results);

        let elapsed = start.elapsed();
        self.progress.complete(elapsed);
        Ok(SyncReport::new(results, elapsed))
    }

    /// Synchronizes a single repository by name.
    pub fn sync_one(&mut self, name: &str) -> Result<OperationResult> {
        let start = Instant::now();
        let repo = self
            .config
            .get_repository(name)
            .cloned()
            .ok_or_else(|| Error::RepositoryNotFound {
                name: name.to_string(),
            })?;

        self.ensure_work_dir()?;

        let result = self.sync_repository(&repo);
        self.record(std::slice::from_ref(&repo), std::slice::from_ref(&result));
        self.progress.complete(start.elapsed());
        Ok(result)
    }

    /// Reports the local state of every repository selected by `filter`
    /// without changing anything.
    pub fn status(&self, filter: &Filter) -> Result<Vec<RepoStatus>> {
        resolve_repositories(filter, &self.config)?
            .into_iter()
            .map(|repo| self.repo_status(repo))
            .collect()
    }

    /// Adds a repository to the catalog, detecting its type from the URL and
    /// defaulting its path to its name.
    pub fn add_repository(&mut self, mut repo: Repository) -> Result<()> {
        if repo.kind.is_none() {
            repo.kind = Some(TransportKind::detect(&repo.url));
        }
        if repo.path.as_deref().is_none_or(str::is_empty) {
            repo.path = Some(repo.name.clone());
        }
        self.config.add_repository(repo)
    }

    /// Removes a repository from the catalog and drops its lock entry.
    pub fn remove_repository(&mut self, name: &str) -> Result<Repository> {
        let removed = self.config.remove_repository(name)?;
        if self.lock.remove(name) {
            log::debug!("removed lock entry for {}", name);
        }
        Ok(removed)
    }

    /// Declares a project. Every listed repository must already exist.
    pub fn add_project(&mut self, project: Project) -> Result<()> {
        if project.name.trim().is_empty() {
            return Err(Error::Validation {
                field: "project.name".to_string(),
                message: "name is required".to_string(),
            });
        }
        self.config.add_project(project)
    }

    /// Removes a project grouping. Its repositories are not touched.
    pub fn remove_project(&mut self, name: &str) -> Result<Project> {
        self.config.remove_project(name)
    }

    pub fn add_repo_to_project(&mut self, project: &str, repo: &str) -> Result<()> {
        self.config.add_repo_to_project(project, repo)
    }

    pub fn remove_repo_from_project(&mut self, project: &str, repo: &str) -> Result<()> {
        self.config.remove_repo_from_project(project, repo)
    }

    fn ensure_work_dir(&self) -> Result<()> {
        let dir = self.config.work_dir();
        std::fs::create_dir_all(dir).map_err(|source| Error::WorkDir {
            path: dir.display().to_string(),
            source,
        })
    }

    fn sync_all(&self, repos: &[Repository]) -> Result<Vec<OperationResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("repo-fleet-sync-{}", i))
            .build()
            .map_err(|e| Error::ThreadPool {
                message: e.to_string(),
            })?;

        // An indexed parallel collect writes each result to its input slot.
        Ok(pool.install(|| {
            repos
                .par_iter()
                .map(|repo| self.sync_repository(repo))
                .collect()
        }))
    }

    /// Writes lock entries for successful results. No-op in locked mode.
    fn record(&mut self, repos: &[Repository], results: &[OperationResult]) {
        if self.locked {
            return;
        }

        let default_branch = self.config.general.default_branch.clone();
        for (repo, result) in repos.iter().zip(results) {
            if !result.is_success() {
                continue;
            }
            let entry = LockEntry::new(
                repo.url.clone(),
                repo.transport_kind(),
                repo.effective_ref(&default_branch),
                result.resolved_ref(),
            )
            .with_submodules(result.submodules().to_vec());

            log::debug!("locking {} at {}", repo.name, result.resolved_ref());
            self.lock.set(&repo.name, entry);
        }
    }

    fn sync_repository(&self, repo: &Repository) -> OperationResult {
        let started = Instant::now();
        let started_at = Utc::now();

        self.notify(repo, Phase::Init, started_at, |e| e.with_message("Starting..."));

        let outcome = self.drive(repo, started, started_at);
        let duration = started.elapsed();

        match outcome {
            Ok((resolved, submodules)) => {
                let short = transport::short_ref(&resolved).to_string();
                self.notify(repo, Phase::Complete, started_at, |e| {
                    e.with_message(format!("Synced at {}", short))
                        .with_percent(Some(100.0))
                });
                log::info!("{} synced at {} in {:.1?}", repo.name, short, duration);

                OperationResult::succeeded(&repo.name, &repo.url, resolved, duration)
                    .with_selectors(repo.branch.clone(), repo.tag.clone())
                    .with_submodules(submodules)
            }
            Err(err) => {
                self.notify(repo, Phase::Failed, started_at, |e| {
                    e.with_message(err.to_string()).with_error(&err)
                });
                log::warn!("{} failed: {}", repo.name, err);

                OperationResult::failed(&repo.name, &repo.url, err, duration)
                    .with_selectors(repo.branch.clone(), repo.tag.clone())
            }
        }
    }

    fn drive(
        &self,
        repo: &Repository,
        started: Instant,
        started_at: DateTime<Utc>,
    ) -> Result<(String, Vec<SubmoduleLock>)> {
        let locked_ref = if self.locked {
            let recorded = self
                .lock
                .resolved_ref(&repo.name)
                .ok_or_else(|| Error::MissingLockEntry {
                    name: repo.name.clone(),
                })?;
            Some(recorded.to_string())
        } else {
            None
        };

        let cancel = CancelToken::new();
        let mut options =
            TransportOptions::for_repository(repo, &self.config).with_cancel(cancel.clone());
        if let Some(recorded) = &locked_ref {
            options = options.pinned_to(recorded);
        }

        let transport = self.provider.create(repo.transport_kind(), options)?;
        let destination = self.config.work_dir().join(repo.effective_path());

        let stream = if transport::exists(&destination) {
            transport.update_existing_with_progress(&repo.url, &destination)?
        } else {
            transport.fetch_new_with_progress(&repo.url, &destination)?
        };

        let resolved = match self.drain(repo, stream, &cancel, started, started_at)? {
            Some(resolved) if !resolved.is_empty() => resolved,
            _ => transport.current_resolved_ref(&destination)?,
        };

        if let Some(expected) = locked_ref {
            if resolved != expected {
                return Err(Error::LockMismatch {
                    name: repo.name.clone(),
                    expected,
                    actual: resolved,
                });
            }
        }

        let submodules = transport.submodule_locks(&destination).unwrap_or_else(|e| {
            log::warn!("could not record submodules of {}: {}", repo.name, e);
            Vec::new()
        });

        Ok((resolved, submodules))
    }

    /// Forwards a transport's progress to the sink until the stream closes.
    ///
    /// Terminal updates are not forwarded; the caller reports the outcome.
    /// When the deadline passes the transport is cancelled and the stream is
    /// drained to closure before the timeout is returned.
    fn drain(
        &self,
        repo: &Repository,
        stream: ProgressStream,
        cancel: &CancelToken,
        started: Instant,
        started_at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let timeout = self.config.general.timeout();
        let deadline = (!timeout.is_zero()).then(|| started + timeout);
        let mut resolved = None;

        loop {
            let received = match deadline {
                Some(deadline) => stream.recv_deadline(deadline),
                None => stream.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            let update = match received {
                Ok(update) => update,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "{} exceeded {}s, stopping its transfer",
                        repo.name,
                        timeout.as_secs()
                    );
                    cancel.cancel();
                    // the pool slot stays taken until the worker lets go
                    for _ in stream.iter() {}
                    return Err(Error::Timeout {
                        name: repo.name.clone(),
                        after: timeout,
                    });
                }
            };

            if let Some(err) = update.error {
                return Err(err);
            }

            match update.phase {
                Phase::Complete => resolved = update.resolved_ref,
                Phase::Failed => {
                    return Err(Error::Transport {
                        name: repo.name.clone(),
                        message: update.message,
                    });
                }
                Phase::Init => {}
                phase => {
                    let percent = update.percent();
                    let message = update.message;
                    self.notify(repo, phase, started_at, |e| {
                        e.with_percent(percent).with_message(message)
                    });
                }
            }
        }

        Ok(resolved)
    }

    fn notify(
        &self,
        repo: &Repository,
        phase: Phase,
        started_at: DateTime<Utc>,
        build: impl FnOnce(ProgressEvent) -> ProgressEvent,
    ) {
        let event = ProgressEvent::new(&repo.name, &repo.url, phase, started_at);
        self.progress.notify(build(event));
    }

    fn repo_status(&self, repo: &Repository) -> Result<RepoStatus> {
        let kind = repo.transport_kind();
        let path = self.config.work_dir().join(repo.effective_path());
        let requested_ref = repo.effective_ref(&self.config.general.default_branch);
        let locked_ref = self.lock.resolved_ref(&repo.name).map(str::to_string);

        let mut status = RepoStatus {
            name: repo.name.clone(),
            path: path.clone(),
            kind,
            exists: transport::exists(&path),
            current_ref: None,
            locked_ref,
            requested_ref,
            branch: None,
            is_dirty: false,
            needs_update: true,
            error: None,
        };

        if !status.exists {
            return Ok(status);
        }

        let options = TransportOptions::for_repository(repo, &self.config);
        let transport = self.provider.create(kind, options)?;
        match transport.current_resolved_ref(&path) {
            Ok(current) => status.current_ref = Some(current),
            Err(e) => status.error = Some(e.to_string()),
        }

        if kind == TransportKind::Git && git::is_git_repository(&path) {
            status.branch = git::current_branch(&path).ok().flatten();
            status.is_dirty = git::is_dirty(&path).unwrap_or(false);
        }

        status.needs_update = match (&status.current_ref, &status.locked_ref) {
            (Some(current), Some(locked)) => {
                current != locked || self.lock.should_update(&repo.name, &status.requested_ref)
            }
            _ => true,
        };

        Ok(status)
    }
}

/// Formats a duration the way the CLI prints batch timings.
pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 60 {
        format!("{}m{:02}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

//! # Lock File
//!
//! The lock records, per repository, the reference that was requested and the
//! resolved reference (commit id or content digest) that the last successful
//! sync produced. A later `sync --locked` reproduces exactly those references.
//!
//! The orchestrator talks to the lock through the [`LockStore`] trait; the
//! on-disk implementation is [`LockFile`], a TOML document stored next to the
//! configuration:
//!
//! ```toml
//! # repo-fleet lock file
//! # DO NOT EDIT - this file is generated by `repo-fleet sync`
//!
//! version = 1
//! generated_at = "2024-05-01T10:00:00Z"
//!
//! [entry.api]
//! url = "https://github.com/acme/api.git"
//! type = "git"
//! requested_ref = "main"
//! resolved_ref = "4f1c2e..."
//! last_synced_at = "2024-05-01T10:00:00Z"
//! ```
//!
//! A [`LockStore`] is not internally synchronized. The sync manager only
//! reads it while workers run and writes it after they have all joined.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::TransportKind;

/// Current lock file format version.
pub const LOCK_VERSION: u32 = 1;

const HEADER: &str = "# repo-fleet lock file\n# DO NOT EDIT - this file is generated by `repo-fleet sync`\n\n";

/// The locked state of one submodule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleLock {
    pub path: String,
    pub url: String,
    pub resolved_ref: String,
}

/// The locked state of one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// The selector that was asked for (branch, tag, commit, or default branch).
    pub requested_ref: String,
    /// What the selector resolved to.
    pub resolved_ref: String,
    pub last_synced_at: DateTime<Utc>,
    #[serde(rename = "submodule", default, skip_serializing_if = "Vec::is_empty")]
    pub submodules: Vec<SubmoduleLock>,
}

impl LockEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        url: impl Into<String>,
        kind: TransportKind,
        requested_ref: impl Into<String>,
        resolved_ref: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            requested_ref: requested_ref.into(),
            resolved_ref: resolved_ref.into(),
            last_synced_at: Utc::now(),
            submodules: Vec::new(),
        }
    }

    pub fn with_submodules(mut self, submodules: Vec<SubmoduleLock>) -> Self {
        self.submodules = submodules;
        self
    }

    /// True if the entry was recorded for a different requested reference.
    pub fn is_stale(&self, requested_ref: &str) -> bool {
        self.requested_ref != requested_ref
    }

    /// Time since the entry was recorded.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.last_synced_at)
    }
}

/// Storage for lock entries, keyed by repository name.
pub trait LockStore: Send + Sync {
    fn get(&self, name: &str) -> Option<&LockEntry>;

    fn set(&mut self, name: &str, entry: LockEntry);

    /// Removes an entry, returning whether one existed.
    fn remove(&mut self, name: &str) -> bool;

    fn names(&self) -> BTreeSet<String>;

    /// Writes the store to `path`.
    fn persist(&mut self, path: &Path) -> Result<()>;

    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True if there is no entry or it was recorded for another requested ref.
    fn should_update(&self, name: &str, requested_ref: &str) -> bool {
        self.get(name)
            .map_or(true, |entry| entry.is_stale(requested_ref))
    }

    fn resolved_ref(&self, name: &str) -> Option<&str> {
        self.get(name).map(|entry| entry.resolved_ref.as_str())
    }
}

/// The TOML-backed lock store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockFile {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "entry", default)]
    entries: BTreeMap<String, LockEntry>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self::new()
    }
}

impl LockFile {
    /// Creates an empty, in-memory lock.
    pub fn new() -> Self {
        Self {
            version: LOCK_VERSION,
            generated_at: Utc::now(),
            entries: BTreeMap::new(),
            path: None,
        }
    }

    /// Loads a lock file. A missing file yields an empty lock bound to `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::new()
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut lock: LockFile = toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("invalid lock file {}: {}", path.display(), e.message()),
            hint: Some("delete the lock file and run `repo-fleet sync` to regenerate it".into()),
        })?;
        lock.path = Some(path.to_path_buf());
        Ok(lock)
    }

    /// The path this lock was loaded from or last persisted to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &LockEntry)> {
        self.entries.iter()
    }
}

impl LockStore for LockFile {
    fn get(&self, name: &str) -> Option<&LockEntry> {
        self.entries.get(name)
    }

    fn set(&mut self, name: &str, entry: LockEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    fn names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    fn persist(&mut self, path: &Path) -> Result<()> {
        self.generated_at = Utc::now();
        let body = toml::to_string_pretty(&*self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename so readers never see a torn file.
        let tmp = path.with_extension("lock.tmp");
        std::fs::write(&tmp, format!("{}{}", HEADER, body))?;
        std::fs::rename(&tmp, path)?;

        log::debug!("wrote {} lock entries to {}", self.entries.len(), path.display());
        self.path = Some(path.to_path_buf());
        Ok(())
    }
}

//! Per-repository outcomes and the aggregate report of a sync batch.

use std::time::Duration;

use crate::error::Error;
use crate::lockfile::SubmoduleLock;
use crate::transport::short_ref;

/// The outcome of syncing one repository.
///
/// Built only through [`OperationResult::succeeded`] or
/// [`OperationResult::failed`], so an error is present exactly when the
/// result is a failure.
#[derive(Debug)]
pub struct OperationResult {
    name: String,
    url: String,
    success: bool,
    error: Option<Error>,
    duration: Duration,
    resolved_ref: String,
    branch: Option<String>,
    tag: Option<String>,
    submodules: Vec<SubmoduleLock>,
}

impl OperationResult {
    pub fn succeeded(
        name: impl Into<String>,
        url: impl Into<String>,
        resolved_ref: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            success: true,
            error: None,
            duration,
            resolved_ref: resolved_ref.into(),
            branch: None,
            tag: None,
            submodules: Vec::new(),
        }
    }

    pub fn failed(
        name: impl Into<String>,
        url: impl Into<String>,
        error: Error,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            success: false,
            error: Some(error),
            duration,
            resolved_ref: String::new(),
            branch: None,
            tag: None,
            submodules: Vec::new(),
        }
    }

    pub fn with_selectors(mut self, branch: Option<String>, tag: Option<String>) -> Self {
        self.branch = branch;
        self.tag = tag;
        self
    }

    pub fn with_submodules(mut self, submodules: Vec<SubmoduleLock>) -> Self {
        self.submodules = submodules;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Commit id or content digest; empty on failure.
    pub fn resolved_ref(&self) -> &str {
        &self.resolved_ref
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn submodules(&self) -> &[SubmoduleLock] {
        &self.submodules
    }

    /// The resolved reference shortened for display.
    pub fn short_ref(&self) -> &str {
        short_ref(&self.resolved_ref)
    }
}

/// The aggregate result of one sync batch, in input order.
///
/// The counts are derived from the results when the report is built and
/// cannot be changed afterwards.
#[derive(Debug, Default)]
pub struct SyncReport {
    total: usize,
    succeeded: usize,
    failed: usize,
    results: Vec<OperationResult>,
    duration: Duration,
}

impl SyncReport {
    pub fn new(results: Vec<OperationResult>, duration: Duration) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            duration,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn results(&self) -> &[OperationResult] {
        &self.results
    }

    /// Wall-clock time of the whole batch.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

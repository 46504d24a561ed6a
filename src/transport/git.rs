//! # Git Transport
//!
//! Synchronizes repositories by driving the system `git` binary, so SSH keys,
//! credential helpers, and anything else configured in `~/.gitconfig` work
//! without extra setup.
//!
//! ## Reference handling
//!
//! - **Default branch**: clone the remote's `HEAD`; updates reset the branch
//!   `origin/HEAD` names (or the current local branch, or the configured
//!   `default_branch`) to its remote-tracking head.
//! - **Branch**: `clone --branch <b> --single-branch`; updates reset the local
//!   branch to `origin/<b>`.
//! - **Tag**: `clone --branch <tag>` followed by a checkout of the tag.
//! - **Commit**: clone, then check out the commit. In a shallow clone the commit
//!   may lie outside the fetched window; the transport then fetches the commit
//!   by id at the configured depth, falls back to `fetch --unshallow`, and
//!   retries the checkout once.
//!
//! Retries of network operations are left to `git` itself.

use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crossbeam::channel::{unbounded, RecvTimeoutError};
use regex::Regex;

use super::{
    exists, CancelToken, RefTarget, Transport, TransportKind, TransportOptions, CANCEL_POLL,
};
use crate::error::{Error, Result};
use crate::lockfile::SubmoduleLock;
use crate::progress::{self, Phase, ProgressEmitter, ProgressStream, ProgressUpdate};

/// Lines of `git` stderr kept for error messages.
const STDERR_TAIL: usize = 20;

/// The version-control backend.
#[derive(Debug, Clone)]
pub struct GitTransport {
    options: TransportOptions,
}

impl GitTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Arguments for the initial clone of `source` into `destination`.
    pub fn clone_args(&self, source: &str, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["clone".into(), "--progress".into()];

        if self.options.shallow && self.options.depth > 0 {
            args.push("--depth".into());
            args.push(self.options.depth.to_string().into());
        }

        match &self.options.target {
            RefTarget::Branch(branch) => {
                args.push("--branch".into());
                args.push(branch.into());
                args.push("--single-branch".into());
            }
            RefTarget::Tag(tag) => {
                args.push("--branch".into());
                args.push(tag.into());
            }
            RefTarget::Commit(_) | RefTarget::DefaultBranch(_) => {}
        }

        if self.options.submodules {
            args.push("--recurse-submodules".into());
        }

        args.push(source.into());
        args.push(destination.as_os_str().to_os_string());
        args
    }

    /// Arguments for refreshing an existing clone from its remote.
    pub fn fetch_args() -> Vec<OsString> {
        ["fetch", "--all", "--force", "--tags", "--progress"]
            .iter()
            .map(OsString::from)
            .collect()
    }

    fn clone_into(&self, emitter: &ProgressEmitter, source: &str, destination: &Path) -> Result<String> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        emitter.phase(Phase::Connecting, format!("Connecting to {}", source));
        emitter.phase(Phase::Fetching, "Cloning repository...");

        let args = self.clone_args(source, destination);
        run_with_progress(&args, None, emitter, &self.options.cancel).map_err(|stderr| {
            self.cancelled_or(source, || Error::GitClone {
                url: source.to_string(),
                r#ref: self.options.target.as_str().to_string(),
                hint: clone_hint(&stderr),
                message: stderr,
            })
        })?;

        self.check_cancelled(source)?;
        if self.options.target.needs_checkout() {
            emitter.phase(
                Phase::Checkout,
                format!("Checking out {}", self.options.target.as_str()),
            );
            self.checkout_target(destination)?;
        }

        head_commit(destination)
    }

    fn update_in_place(
        &self,
        emitter: &ProgressEmitter,
        source: &str,
        destination: &Path,
    ) -> Result<String> {
        emitter.phase(Phase::Connecting, "Contacting remote...");
        emitter.phase(Phase::Fetching, "Fetching updates...");

        let args = Self::fetch_args();
        run_with_progress(&args, Some(destination), emitter, &self.options.cancel).map_err(
            |stderr| {
                self.cancelled_or(source, || Error::GitCommand {
                    command: "git fetch --all --force --tags".to_string(),
                    location: destination.display().to_string(),
                    stderr,
                })
            },
        )?;

        self.check_cancelled(source)?;
        if !matches!(self.options.target, RefTarget::DefaultBranch(_)) {
            emitter.phase(
                Phase::Checkout,
                format!("Checking out {}", self.options.target.as_str()),
            );
        }
        self.checkout_target(destination)?;

        head_commit(destination)
    }

    /// Moves the working tree to the configured target.
    fn checkout_target(&self, destination: &Path) -> Result<()> {
        match &self.options.target {
            RefTarget::Commit(commit) => self.checkout_commit(destination, commit),
            RefTarget::Tag(tag) => {
                let tag_ref = format!("refs/tags/{}", tag);
                run_git(&["checkout", "--force", &tag_ref], destination).map(|_| ())
            }
            RefTarget::Branch(branch) => reset_branch(destination, branch),
            RefTarget::DefaultBranch(fallback) => {
                let branch = remote_default_branch(destination)
                    .or_else(|| current_branch(destination).ok().flatten())
                    .unwrap_or_else(|| fallback.clone());
                reset_branch(destination, &branch)
            }
        }
    }

    fn checkout_commit(&self, destination: &Path, commit: &str) -> Result<()> {
        let first = run_git(&["checkout", "--force", commit], destination);
        if first.is_ok() || !is_shallow_repository(destination) {
            return first.map(|_| ());
        }

        log::debug!(
            "{} is outside the shallow window of {}, deepening",
            commit,
            destination.display()
        );

        let depth = format!("--depth={}", self.options.depth.max(1));
        if run_git(&["fetch", &depth, "origin", commit], destination).is_err() {
            run_git(&["fetch", "--unshallow", "--tags", "origin"], destination)?;
        }

        run_git(&["checkout", "--force", commit], destination).map(|_| ())
    }

    fn check_cancelled(&self, source: &str) -> Result<()> {
        if self.options.cancel.is_cancelled() {
            Err(Error::Cancelled {
                url: source.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// `Error::Cancelled` if the token fired, otherwise the error from `other`.
    fn cancelled_or(&self, source: &str, other: impl FnOnce() -> Error) -> Error {
        match self.check_cancelled(source) {
            Err(cancelled) => cancelled,
            Ok(()) => other(),
        }
    }

    fn spawn_worker<F>(&self, work: F) -> ProgressStream
    where
        F: FnOnce(&GitTransport, &ProgressEmitter) -> Result<String> + Send + 'static,
    {
        let (emitter, stream) = ProgressEmitter::channel();
        let transport = self.clone();
        std::thread::spawn(move || {
            let result = work(&transport, &emitter);
            emitter.finish(result);
        });
        stream
    }
}

impl Transport for GitTransport {
    fn fetch_new(&self, source: &str, destination: &Path) -> Result<String> {
        let stream = self.fetch_new_with_progress(source, destination)?;
        match progress::wait_for(stream)? {
            Some(resolved) => Ok(resolved),
            None => self.current_resolved_ref(destination),
        }
    }

    fn fetch_new_with_progress(&self, source: &str, destination: &Path) -> Result<ProgressStream> {
        let source = source.to_string();
        let destination = destination.to_path_buf();
        let created = !exists(&destination);

        Ok(self.spawn_worker(move |transport, emitter| {
            let result = transport.clone_into(emitter, &source, &destination);
            if result.is_err() && created {
                discard_partial(&destination);
            }
            result
        }))
    }

    fn update_existing(&self, source: &str, destination: &Path) -> Result<String> {
        let stream = self.update_existing_with_progress(source, destination)?;
        match progress::wait_for(stream)? {
            Some(resolved) => Ok(resolved),
            None => self.current_resolved_ref(destination),
        }
    }

    fn update_existing_with_progress(
        &self,
        source: &str,
        destination: &Path,
    ) -> Result<ProgressStream> {
        if !is_git_repository(destination) {
            return Err(Error::GitCommand {
                command: "git fetch".to_string(),
                location: destination.display().to_string(),
                stderr: format!("not a git repository (expected a clone of {})", source),
            });
        }

        let source = source.to_string();
        let destination = destination.to_path_buf();
        Ok(self.spawn_worker(move |transport, emitter| {
            transport.update_in_place(emitter, &source, &destination)
        }))
    }

    fn current_resolved_ref(&self, destination: &Path) -> Result<String> {
        head_commit(destination)
    }

    fn submodule_locks(&self, destination: &Path) -> Result<Vec<SubmoduleLock>> {
        if !self.options.submodules || !destination.join(".gitmodules").exists() {
            return Ok(Vec::new());
        }

        let status = run_git(&["submodule", "status", "--recursive"], destination)?;
        Ok(parse_submodule_status(&status)
            .into_iter()
            .map(|(path, resolved_ref)| {
                let url = remote_url(&destination.join(&path)).unwrap_or_default();
                SubmoduleLock {
                    path,
                    url,
                    resolved_ref,
                }
            })
            .collect())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Git
    }
}

/// Runs `git` with `args` in `cwd`, returning trimmed stdout.
fn run_git(args: &[&str], cwd: &Path) -> Result<String> {
    log::debug!("git {} (in {})", args.join(" "), cwd.display());

    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| Error::GitCommand {
            command: format!("git {}", args.join(" ")),
            location: cwd.display().to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::GitCommand {
            command: format!("git {}", args.join(" ")),
            location: cwd.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs a long `git` command, forwarding its stderr progress to `emitter`.
///
/// Stderr is read on a helper thread so the child can be killed as soon as
/// `cancel` fires. On failure returns the tail of stderr as the message.
fn run_with_progress(
    args: &[OsString],
    cwd: Option<&Path>,
    emitter: &ProgressEmitter,
    cancel: &CancelToken,
) -> std::result::Result<(), String> {
    log::debug!(
        "git {}",
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut command = Command::new("git");
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| format!("failed to start git: {}", e))?;

    let (line_tx, lines) = unbounded::<String>();
    match child.stderr.take() {
        Some(stderr) => {
            std::thread::spawn(move || {
                for_each_progress_line(stderr, |line| {
                    let _ = line_tx.send(line.to_string());
                });
            });
        }
        None => drop(line_tx),
    }

    let mut tail: Vec<String> = Vec::new();
    loop {
        if cancel.is_cancelled() {
            log::debug!("cancelled, killing git (pid {})", child.id());
            let _ = child.kill();
            let _ = child.wait();
            return Err("cancelled".to_string());
        }

        let line = match lines.recv_timeout(CANCEL_POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut update = ProgressUpdate::new(Phase::Fetching, line.as_str());
        if let Some((done, total)) = extract_progress(&line) {
            update = update.with_objects(done, total);
        }
        emitter.try_emit(update);

        if tail.len() == STDERR_TAIL {
            tail.remove(0);
        }
        tail.push(line);
    }

    let status = child.wait().map_err(|e| format!("failed to wait for git: {}", e))?;
    if status.success() {
        Ok(())
    } else {
        let mut message = tail.join("\n");
        if message.is_empty() {
            message = format!("git exited with {}", status);
        }
        Err(message)
    }
}

/// Splits `reader` on `\r` and `\n`, calling `on_line` for each non-empty line.
///
/// `git` redraws progress lines with carriage returns.
pub fn for_each_progress_line<R: Read>(mut reader: R, mut on_line: impl FnMut(&str)) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            if byte == b'\r' || byte == b'\n' {
                flush_line(&mut pending, &mut on_line);
            } else {
                pending.push(byte);
            }
        }
    }
    flush_line(&mut pending, &mut on_line);
}

fn flush_line(pending: &mut Vec<u8>, on_line: &mut impl FnMut(&str)) {
    if !pending.is_empty() {
        let line = String::from_utf8_lossy(pending);
        let line = line.trim();
        if !line.is_empty() {
            on_line(line);
        }
        pending.clear();
    }
}

/// Extracts `(done, total)` from a `git` progress line.
///
/// `Receiving objects:  45% (450/1000)` yields `(450, 1000)`; a bare
/// percentage yields `(pct, 100)`.
pub fn extract_progress(line: &str) -> Option<(u64, u64)> {
    static COUNTS_RE: OnceLock<Regex> = OnceLock::new();
    static PERCENT_RE: OnceLock<Regex> = OnceLock::new();

    let counts = COUNTS_RE
        .get_or_init(|| Regex::new(r"(\d+)%\s*\((\d+)/(\d+)\)").expect("static regex is valid"));
    if let Some(caps) = counts.captures(line) {
        let done = caps[2].parse().ok()?;
        let total = caps[3].parse().ok()?;
        return Some((done, total));
    }

    let percent = PERCENT_RE.get_or_init(|| Regex::new(r"(\d+)%").expect("static regex is valid"));
    let caps = percent.captures(line)?;
    let pct: u64 = caps[1].parse().ok()?;
    Some((pct.min(100), 100))
}

/// Parses `git submodule status --recursive` into `(path, commit)` pairs.
pub fn parse_submodule_status(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            // Leading status flag: ' ', '-', '+', or 'U'
            let line = line.trim_start_matches([' ', '-', '+', 'U']);
            let mut parts = line.split_whitespace();
            let commit = parts.next()?;
            let path = parts.next()?;
            Some((path.to_string(), commit.to_string()))
        })
        .collect()
}

fn clone_hint(stderr: &str) -> Option<String> {
    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        Some(
            "check that your SSH key is loaded or your git credentials can access this repository"
                .to_string(),
        )
    } else if stderr.contains("Remote branch") && stderr.contains("not found") {
        Some("the requested branch or tag does not exist on the remote".to_string())
    } else {
        None
    }
}

fn discard_partial(destination: &Path) {
    if destination.exists() {
        if let Err(e) = std::fs::remove_dir_all(destination) {
            log::warn!(
                "failed to remove partial clone at {}: {}",
                destination.display(),
                e
            );
        }
    }
}

fn reset_branch(destination: &Path, branch: &str) -> Result<()> {
    let remote = format!("origin/{}", branch);
    run_git(&["checkout", "--force", "-B", branch, &remote], destination).map(|_| ())
}

/// The branch `origin/HEAD` points at, if the remote advertised one.
fn remote_default_branch(destination: &Path) -> Option<String> {
    run_git(
        &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
        destination,
    )
    .ok()
    .and_then(|r| r.strip_prefix("origin/").map(str::to_string))
}

fn head_commit(destination: &Path) -> Result<String> {
    run_git(&["rev-parse", "HEAD"], destination)
}

fn is_shallow_repository(path: &Path) -> bool {
    run_git(&["rev-parse", "--is-shallow-repository"], path).is_ok_and(|out| out == "true")
}

/// True if `path` contains a `.git` directory.
pub fn is_git_repository(path: &Path) -> bool {
    path.join(".git").is_dir()
}

/// The URL of the `origin` remote.
pub fn remote_url(path: &Path) -> Result<String> {
    run_git(&["remote", "get-url", "origin"], path)
}

/// True if the working tree has uncommitted changes.
pub fn is_dirty(path: &Path) -> Result<bool> {
    run_git(&["status", "--porcelain"], path).map(|out| !out.is_empty())
}

/// The checked-out branch, or `None` for a detached `HEAD`.
pub fn current_branch(path: &Path) -> Result<Option<String>> {
    let branch = run_git(&["rev-parse", "--abbrev-ref", "HEAD"], path)?;
    Ok((branch != "HEAD").then_some(branch))
}

//! # Progress Reporting
//!
//! Progress flows through two layers:
//!
//! 1. **Transport level.** A transport reports [`ProgressUpdate`]s on a bounded
//!    [`ProgressStream`]. Producers hold a [`ProgressEmitter`], which is the only
//!    way to write to the stream. Intermediate updates are best-effort and are
//!    dropped when the buffer is full; the terminal update (`complete` or
//!    `failed`) is always delivered last, after which the stream closes.
//! 2. **Orchestrator level.** The sync manager translates updates into
//!    [`ProgressEvent`]s for a [`ProgressSink`]. Sinks must never block a sync
//!    task. [`NullSink`] discards everything (headless use); [`ChannelSink`]
//!    forwards to a single consumer thread that owns all rendering state.
//!
//! ## Phases
//!
//! `init → connecting → fetching → checkout → complete | failed`
//!
//! `checkout` only appears when a tag or exact commit was requested. Both
//! terminal phases are absorbing.

use std::fmt;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::error::{Error, Result};

/// Capacity of a transport's progress stream.
pub const STREAM_CAPACITY: usize = 10;

/// Capacity of the queue between the orchestrator and a renderer thread.
pub const SINK_CAPACITY: usize = 256;

/// A step in the life of one repository's sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Init,
    Connecting,
    Fetching,
    Checkout,
    Complete,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Connecting => "connecting",
            Phase::Fetching => "fetching",
            Phase::Checkout => "checkout",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        }
    }

    /// True for `complete` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One update on a transport's progress stream.
#[derive(Debug)]
pub struct ProgressUpdate {
    pub phase: Phase,
    pub bytes_done: u64,
    /// Zero when the total size is unknown.
    pub bytes_total: u64,
    pub objects_done: u64,
    pub objects_total: u64,
    pub message: String,
    /// Set on the final `complete` update.
    pub resolved_ref: Option<String>,
    /// Set on the final `failed` update.
    pub error: Option<Error>,
}

impl ProgressUpdate {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            bytes_done: 0,
            bytes_total: 0,
            objects_done: 0,
            objects_total: 0,
            message: message.into(),
            resolved_ref: None,
            error: None,
        }
    }

    pub fn with_bytes(mut self, done: u64, total: u64) -> Self {
        self.bytes_done = done;
        self.bytes_total = total;
        self
    }

    pub fn with_objects(mut self, done: u64, total: u64) -> Self {
        self.objects_done = done;
        self.objects_total = total;
        self
    }

    /// Percentage complete, when a total is known.
    ///
    /// Byte counters win over object counters.
    pub fn percent(&self) -> Option<f64> {
        if self.bytes_total > 0 {
            Some(self.bytes_done as f64 / self.bytes_total as f64 * 100.0)
        } else if self.objects_total > 0 {
            Some(self.objects_done as f64 / self.objects_total as f64 * 100.0)
        } else {
            None
        }
    }
}

/// The receiving end of a transport's progress.
pub type ProgressStream = Receiver<ProgressUpdate>;

/// The sending end of a transport's progress.
///
/// `finish` consumes the emitter, so nothing can be sent after the terminal
/// update and the stream closes when it returns.
#[derive(Debug)]
pub struct ProgressEmitter {
    tx: Sender<ProgressUpdate>,
}

impl ProgressEmitter {
    /// Creates an emitter and its stream with the default capacity.
    pub fn channel() -> (Self, ProgressStream) {
        Self::with_capacity(STREAM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, ProgressStream) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }

    /// Sends a phase change, waiting for buffer space.
    ///
    /// A receiver that went away is not an error: the orchestrator stops
    /// listening after a timeout.
    pub fn emit(&self, update: ProgressUpdate) {
        debug_assert!(!update.phase.is_terminal(), "use finish() for terminal updates");
        let _ = self.tx.send(update);
    }

    /// Sends an intermediate update, dropping it if the buffer is full.
    pub fn try_emit(&self, update: ProgressUpdate) {
        match self.tx.try_send(update) {
            Ok(()) | Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn phase(&self, phase: Phase, message: impl Into<String>) {
        self.emit(ProgressUpdate::new(phase, message));
    }

    /// Sends the terminal update for `result` and closes the stream.
    pub fn finish(self, result: Result<String>) {
        let update = match result {
            Ok(resolved) => {
                let mut update = ProgressUpdate::new(Phase::Complete, resolved.clone());
                update.resolved_ref = Some(resolved);
                update
            }
            Err(err) => {
                let mut update = ProgressUpdate::new(Phase::Failed, err.to_string());
                update.error = Some(err);
                update
            }
        };
        let _ = self.tx.send(update);
    }
}

/// Drains a stream to closure and returns its outcome.
///
/// `Ok(None)` means the stream closed without reporting a resolved reference.
pub fn wait_for(stream: ProgressStream) -> Result<Option<String>> {
    let mut resolved = None;
    for update in stream {
        if let Some(err) = update.error {
            return Err(err);
        }
        if update.phase == Phase::Complete {
            resolved = update.resolved_ref;
        }
    }
    Ok(resolved)
}

/// A progress notification about one repository, as seen by a sink.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub repo_name: String,
    pub repo_url: String,
    pub phase: Phase,
    /// Percentage complete, if the transport knows a total.
    pub percent: Option<f64>,
    pub message: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    /// Set on terminal events.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressEvent {
    pub fn new(
        repo_name: impl Into<String>,
        repo_url: impl Into<String>,
        phase: Phase,
        started_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            repo_name: repo_name.into(),
            repo_url: repo_url.into(),
            phase,
            percent: None,
            message: String::new(),
            error: None,
            started_at,
            timestamp: now,
            completed_at: phase.is_terminal().then_some(now),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_percent(mut self, percent: Option<f64>) -> Self {
        self.percent = percent;
        self
    }

    pub fn with_error(mut self, error: &Error) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Receives progress events from the sync manager.
///
/// `notify` is called concurrently from worker threads and must not block
/// for long.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: ProgressEvent);

    /// Called once when a whole batch is done.
    fn complete(&self, elapsed: Duration);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn notify(&self, _event: ProgressEvent) {}

    fn complete(&self, _elapsed: Duration) {}
}

/// Draws progress. Owned by the single consumer thread of a [`ChannelSink`].
pub trait Renderer: Send {
    fn render(&mut self, event: &ProgressEvent);

    fn finish(&mut self, elapsed: Duration);
}

enum SinkMessage {
    Event(ProgressEvent),
    Done(Duration, Sender<()>),
}

/// Forwards events over a bounded queue to a dedicated renderer thread.
///
/// When the queue is full the newest intermediate event is dropped. Terminal
/// events wait for space, so every repository's bar gets finished. `complete`
/// waits until the renderer has drawn everything queued before it.
pub struct ChannelSink {
    tx: Sender<SinkMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSink {
    pub fn spawn<R: Renderer + 'static>(renderer: R) -> Self {
        Self::spawn_with_capacity(renderer, SINK_CAPACITY)
    }

    pub fn spawn_with_capacity<R: Renderer + 'static>(mut renderer: R, capacity: usize) -> Self {
        let (tx, rx) = bounded::<SinkMessage>(capacity);
        let worker = std::thread::spawn(move || {
            for message in rx {
                match message {
                    SinkMessage::Event(event) => renderer.render(&event),
                    SinkMessage::Done(elapsed, ack) => {
                        renderer.finish(elapsed);
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self {
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }
}

impl ProgressSink for ChannelSink {
    fn notify(&self, event: ProgressEvent) {
        if event.phase.is_terminal() {
            // sent once per repository; the renderer always drains
            let _ = self.tx.send(SinkMessage::Event(event));
            return;
        }
        if let Err(TrySendError::Full(_)) = self.tx.try_send(SinkMessage::Event(event)) {
            log::trace!("progress queue full, dropping event");
        }
    }

    fn complete(&self, elapsed: Duration) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(SinkMessage::Done(elapsed, ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        // Closing the queue ends the renderer loop.
        let (closed, _) = bounded(0);
        drop(std::mem::replace(&mut self.tx, closed));
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}

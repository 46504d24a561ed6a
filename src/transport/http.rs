//! # HTTP Transport
//!
//! Downloads a single file over HTTP(S). The resolved reference is the
//! hex-encoded SHA-256 of the downloaded bytes, computed while the body is
//! streamed to disk.
//!
//! Each attempt writes to a temporary file next to the destination, which is
//! renamed into place only after the whole body has been written. A failed
//! download never leaves a partial destination behind, and a failed update
//! keeps the previous file.
//!
//! Non-2xx responses and transport errors are retried `retry_attempts` times
//! with a fixed `retry_delay` in between, so a download makes at most
//! `retry_attempts + 1` requests. Cancellation is checked before each
//! attempt, during the delay, and after every chunk of the body; a cancelled
//! download is not retried.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{Transport, TransportKind, TransportOptions};
use crate::error::{Error, Result};
use crate::progress::{self, Phase, ProgressEmitter, ProgressStream, ProgressUpdate};

const CHUNK_SIZE: usize = 32 * 1024;

/// The plain-file backend.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    options: TransportOptions,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(options: TransportOptions) -> Self {
        let mut builder = ureq::AgentBuilder::new().user_agent(&options.user_agent);
        // zero means no deadline
        if !options.timeout.is_zero() {
            builder = builder.timeout(options.timeout);
        }
        let agent = builder.build();
        Self { options, agent }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Downloads with retries, reporting on `emitter`.
    fn download(&self, emitter: &ProgressEmitter, source: &str, destination: &Path) -> Result<String> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let attempts = self.options.retry_attempts + 1;
        let mut last_error = None;

        let cancelled = || Error::Cancelled {
            url: source.to_string(),
        };

        for attempt in 1..=attempts {
            if attempt > 1 {
                emitter.phase(
                    Phase::Connecting,
                    format!("Retrying ({}/{})...", attempt - 1, self.options.retry_attempts),
                );
                if self.options.cancel.sleep(self.options.retry_delay) {
                    return Err(cancelled());
                }
            } else {
                emitter.phase(Phase::Connecting, format!("Connecting to {}", source));
            }

            if self.options.cancel.is_cancelled() {
                return Err(cancelled());
            }

            match self.attempt(emitter, source, destination) {
                Ok(digest) => return Ok(digest),
                Err(err @ Error::Cancelled { .. }) => return Err(err),
                Err(err) => {
                    log::warn!(
                        "download of {} failed (attempt {}/{}): {}",
                        source,
                        attempt,
                        attempts,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(Error::DownloadExhausted {
            url: source.to_string(),
            attempts,
            last: Box::new(last_error.unwrap_or_else(|| Error::Http {
                url: source.to_string(),
                message: "no attempt was made".to_string(),
            })),
        })
    }

    /// One GET request, streamed into a temporary file and renamed into place.
    fn attempt(&self, emitter: &ProgressEmitter, source: &str, destination: &Path) -> Result<String> {
        let response = match self.agent.get(source).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                return Err(Error::Http {
                    url: source.to_string(),
                    message: format!("HTTP {}: {}", code, response.status_text()),
                });
            }
            Err(err) => {
                return Err(Error::Http {
                    url: source.to_string(),
                    message: err.to_string(),
                });
            }
        };

        if !(200..300).contains(&response.status()) {
            return Err(Error::Http {
                url: source.to_string(),
                message: format!("HTTP {}: {}", response.status(), response.status_text()),
            });
        }

        let total: u64 = response
            .header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        emitter.phase(Phase::Fetching, "Downloading...");

        let tmp = temp_path(destination);
        let cancel = &self.options.cancel;
        let result = stream_to_file(response.into_reader(), &tmp, |done| {
            if cancel.is_cancelled() {
                return Err(io::Error::other("cancelled"));
            }
            emitter.try_emit(ProgressUpdate::new(Phase::Fetching, "").with_bytes(done, total));
            Ok(())
        })
        .map_err(|e| {
            if cancel.is_cancelled() {
                Error::Cancelled {
                    url: source.to_string(),
                }
            } else {
                Error::Http {
                    url: source.to_string(),
                    message: format!("failed to read body: {}", e),
                }
            }
        })
        .and_then(|digest| {
            std::fs::rename(&tmp, destination)?;
            Ok(digest)
        });

        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }

    fn spawn_worker(&self, source: &str, destination: &Path) -> ProgressStream {
        let (emitter, stream) = ProgressEmitter::channel();
        let transport = self.clone();
        let source = source.to_string();
        let destination = destination.to_path_buf();

        std::thread::spawn(move || {
            let result = transport.download(&emitter, &source, &destination);
            emitter.finish(result);
        });
        stream
    }
}

impl Transport for HttpTransport {
    fn fetch_new(&self, source: &str, destination: &Path) -> Result<String> {
        let stream = self.fetch_new_with_progress(source, destination)?;
        match progress::wait_for(stream)? {
            Some(digest) => Ok(digest),
            None => self.current_resolved_ref(destination),
        }
    }

    fn fetch_new_with_progress(&self, source: &str, destination: &Path) -> Result<ProgressStream> {
        Ok(self.spawn_worker(source, destination))
    }

    fn update_existing(&self, source: &str, destination: &Path) -> Result<String> {
        let stream = self.update_existing_with_progress(source, destination)?;
        match progress::wait_for(stream)? {
            Some(digest) => Ok(digest),
            None => self.current_resolved_ref(destination),
        }
    }

    fn update_existing_with_progress(
        &self,
        source: &str,
        destination: &Path,
    ) -> Result<ProgressStream> {
        Ok(self.spawn_worker(source, destination))
    }

    fn current_resolved_ref(&self, destination: &Path) -> Result<String> {
        hash_file(destination)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }
}

/// Copies `reader` into a new file at `path`, hashing as it goes.
///
/// `on_progress` receives the running byte count after each chunk; an error
/// from it stops the copy.
fn stream_to_file(
    mut reader: impl Read,
    path: &Path,
    mut on_progress: impl FnMut(u64) -> io::Result<()>,
) -> io::Result<String> {
    let mut file = BufWriter::new(File::create(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut done = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        file.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
        done += n as u64;
        on_progress(done)?;
    }

    file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(hex::encode(hasher.finalize()))
}

fn temp_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    destination.with_file_name(format!(".{}.part", name))
}

/// SHA-256 of a file on disk, hex-encoded.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

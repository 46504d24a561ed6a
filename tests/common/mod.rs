//! Shared test utilities for integration and E2E tests.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_config(configs::TWO_REPOS);
//!     fixture.command().arg("list").assert().success();
//! }
//! ```

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use assert_fs::prelude::*;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::{Reply, TestFixture, TestServer};
}

/// Common configuration TOML snippets for testing.
pub mod configs {
    /// No repositories at all.
    pub const EMPTY: &str = "# repo-fleet configuration\n";

    /// Two git repositories, one tagged, grouped into a project.
    pub const TWO_REPOS: &str = r#"
[general]
work_dir = "repos"

[[repository]]
name = "api"
url = "https://github.com/acme/api.git"
branch = "develop"
tags = ["backend"]

[[repository]]
name = "web"
url = "https://github.com/acme/web.git"
tags = ["frontend"]

[[project]]
name = "platform"
repositories = ["api", "web"]
"#;

    /// Not valid TOML.
    pub const INVALID_TOML: &str = "[[repository]\nname = ";

    /// Valid TOML that fails validation (two selectors).
    pub const CONFLICTING_SELECTORS: &str = r#"
[[repository]]
name = "api"
url = "https://github.com/acme/api.git"
branch = "main"
tag = "v1.0.0"
"#;
}

/// Builds a configuration declaring one HTTP repository per `(name, url)`,
/// with fast retries so failing downloads finish quickly.
pub fn http_config(repos: &[(&str, &str)]) -> String {
    let mut content = String::from(
        "[general]\nwork_dir = \"repos\"\ntimeout_secs = 30\n\n[http]\nretry_attempts = 1\nretry_delay_ms = 10\n",
    );
    for (name, url) in repos {
        content.push_str(&format!(
            "\n[[repository]]\nname = \"{}\"\nurl = \"{}\"\ntype = \"http\"\n",
            name, url
        ));
    }
    content
}

/// A test fixture that provides a temporary directory with optional config.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `.repo-fleet.toml` configuration file with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child(".repo-fleet.toml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join(".repo-fleet.toml")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.temp_dir.path().join(".repo-fleet.lock")
    }

    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.path().join(path)).expect("Failed to read file")
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command configured to run in this fixture's directory.
    ///
    /// Color is disabled so assertions can match the plain markers.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("repo-fleet");
        cmd.current_dir(self.path())
            .env_remove("REPO_FLEET_CONFIG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// One canned HTTP response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: format!("status {}", status).into_bytes(),
        }
    }
}

/// A minimal HTTP/1.1 server on a loopback port.
///
/// Replies are served in order, one per request; the last one repeats.
/// The accept loop runs on a detached thread for the rest of the test.
pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start(replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty(), "TestServer needs at least one reply");
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to read server address");
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = replies.get(n).unwrap_or(&replies[replies.len() - 1]);
                let _ = respond(stream, reply);
            }
        });

        Self { addr, hits }
    }

    /// Always answers 200 with `body`.
    pub fn serving(body: &str) -> Self {
        Self::start(vec![Reply::ok(body)])
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Number of requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn respond(mut stream: TcpStream, reply: &Reply) -> std::io::Result<()> {
    // Consume the request head; bodies are never sent by the client.
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let reason = match reply.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reason,
        reply.body.len()
    )?;
    stream.write_all(&reply.body)?;
    stream.flush()
}

/// SHA-256 of `data` as lowercase hex, as the HTTP transport reports it.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_config() {
        let fixture = TestFixture::new().with_config(configs::EMPTY);
        assert!(fixture.config_path().exists());
    }

    #[test]
    fn test_configs_are_valid_toml() {
        for config in [configs::EMPTY, configs::TWO_REPOS, configs::CONFLICTING_SELECTORS] {
            toml::from_str::<toml::Value>(config).expect("Config should be valid TOML");
        }
        assert!(toml::from_str::<toml::Value>(configs::INVALID_TOML).is_err());
    }
}

//! Test utilities for ipfs-update
//!
//! Available to unit tests and, through the `test-utils` feature, to the integration
//! suite. Nothing here touches the network beyond `127.0.0.1`.
//!
//! - Fetchers with scripted behavior: [`StaticFetcher`], [`FailingFetcher`], [`FlakyFetcher`]
//! - [`TestHttpServer`], a one-response HTTP server for the gateway and API fetchers
//! - Release archive builders matching the distribution layout
//! - Stand-ins for the installer's collaborators: [`FakeLocator`], [`FakeVerifier`],
//!   [`FakeMigrationRunner`]
//!
//! # Example
//!
//! ```rust,no_run
//! use ipfs_update::fetch::Fetcher;
//! use ipfs_update::test_utils::{StaticFetcher, release_archive, release_path};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let fetcher = StaticFetcher::new()
//!     .with_file("kubo/versions", b"v0.18.1\n")
//!     .with_file(&release_path("kubo", "v0.18.1"), release_archive("kubo", "ipfs", b"binary"));
//! assert_eq!(fetcher.fetch("kubo/versions").await?, b"v0.18.1\n");
//! # Ok(())
//! # }
//! ```

use crate::core::UpdateError;
use crate::fetch::{FetchFuture, Fetcher};
use crate::upgrade::acquire::archive_name;
use crate::upgrade::{BinaryLocator, BinaryVerifier, MigrationRunner, StepFuture};
use crate::utils::platform::{exe_name, host_platform};
use anyhow::anyhow;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

fn not_found(path: &str) -> anyhow::Error {
    UpdateError::TransportError {
        path: path.to_string(),
        reason: "404 Not Found".to_string(),
    }
    .into()
}

/// Serves fixed files from memory and records what was asked for.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    files: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl StaticFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` at `path`.
    #[must_use]
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), content.into());
        self
    }

    /// Every path fetched so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Fetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(path.to_string());
        }
        let result = self.files.get(path).cloned().ok_or_else(|| not_found(path));
        Box::pin(async move { result })
    }

    fn close(&self) -> FetchFuture<'_, ()> {
        self.closed.store(true, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// Fails every fetch with a transport error.
#[derive(Debug)]
pub struct FailingFetcher {
    reason: String,
    attempts: AtomicU32,
}

impl FailingFetcher {
    #[must_use]
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Fetcher for FailingFetcher {
    fn name(&self) -> &str {
        "failing"
    }

    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Err(UpdateError::TransportError {
                path: path.to_string(),
                reason: self.reason.clone(),
            }
            .into())
        })
    }
}

/// Fails the first `fail_times` fetches, then returns `payload` for any path.
#[derive(Debug)]
pub struct FlakyFetcher {
    fail_times: u32,
    payload: Vec<u8>,
    attempts: AtomicU32,
}

impl FlakyFetcher {
    #[must_use]
    pub fn new(fail_times: u32, payload: Vec<u8>) -> Self {
        Self {
            fail_times,
            payload,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Fetcher for FlakyFetcher {
    fn name(&self) -> &str {
        "flaky"
    }

    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            if attempt <= self.fail_times {
                Err(UpdateError::TransportError {
                    path: path.to_string(),
                    reason: format!("flaky failure #{attempt}"),
                }
                .into())
            } else {
                Ok(self.payload.clone())
            }
        })
    }
}

/// HTTP server on `127.0.0.1` answering every request with the same status and body.
///
/// The raw request head (request line and headers) of each connection is recorded.
pub struct TestHttpServer {
    addr: SocketAddr,
    requests: Arc<tokio::sync::Mutex<Vec<String>>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestHttpServer {
    /// Start serving. Panics if no local port can be bound.
    pub async fn start(status: u16, body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let head = read_request_head(&mut stream).await;
                log.lock().await.push(head);

                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                    reason_phrase(status),
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(&body).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    /// `http://127.0.0.1:<port>`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Head of the most recent request.
    pub async fn last_request(&self) -> Option<String> {
        self.requests.lock().await.last().cloned()
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_request_head(stream: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Status",
    }
}

/// A local port nothing is listening on (at the time of the call).
pub fn unused_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("find unused port")
}

/// Write an executable `/bin/sh` script with `body`.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// A `.tar.gz` holding `entries` as `(path, content)` pairs.
pub fn build_tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).expect("append tar entry");
    }
    builder
        .into_inner()
        .and_then(flate2::write::GzEncoder::finish)
        .expect("finish tar.gz")
}

/// A `.zip` holding `entries` as `(path, content)` pairs.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (path, content) in entries {
        writer
            .start_file(*path, zip::write::SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Logical path of the release archive of `dist` `version` for this host.
pub fn release_path(dist: &str, version: &str) -> String {
    let (os, arch) = host_platform().expect("supported test host");
    format!("{dist}/{version}/{}", archive_name(dist, version, os, arch))
}

/// A release archive for this host containing `<dist>/<binary>` (`.exe` on Windows).
pub fn release_archive(dist: &str, binary: &str, content: &[u8]) -> Vec<u8> {
    let entry = format!("{dist}/{}", exe_name(binary));
    let entries: [(&str, &[u8]); 1] = [(entry.as_str(), content)];
    if cfg!(windows) { build_zip(&entries) } else { build_tar_gz(&entries) }
}

/// [`BinaryLocator`] with a fixed answer.
#[derive(Debug, Clone)]
pub struct FakeLocator {
    version: String,
    installed: Option<PathBuf>,
    install_dir: Option<PathBuf>,
}

impl FakeLocator {
    /// Reports `version` as installed, with no binary on `PATH`.
    #[must_use]
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            installed: None,
            install_dir: None,
        }
    }

    /// The installed binary. Reported only while the file exists.
    #[must_use]
    pub fn with_installed(mut self, path: impl Into<PathBuf>) -> Self {
        self.installed = Some(path.into());
        self
    }

    /// Directory for a first install.
    #[must_use]
    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }
}

impl BinaryLocator for FakeLocator {
    fn current_version(&self) -> StepFuture<'_, String> {
        let version = self.version.clone();
        Box::pin(async move { Ok(version) })
    }

    fn find_installed(&self) -> Option<PathBuf> {
        self.installed.clone().filter(|p| p.exists())
    }

    fn install_dir(&self) -> anyhow::Result<PathBuf> {
        self.install_dir.clone().ok_or_else(|| anyhow!("no install directory configured"))
    }
}

/// [`BinaryVerifier`] that passes or fails without running anything.
#[derive(Debug, Default)]
pub struct FakeVerifier {
    failure: Option<String>,
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeVerifier {
    #[must_use]
    pub fn passing() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            calls: Mutex::default(),
        }
    }

    /// `(binary, expected version)` per call.
    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl BinaryVerifier for FakeVerifier {
    fn verify<'a>(&'a self, binary: &'a Path, expected: &'a str) -> StepFuture<'a, ()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((binary.to_path_buf(), expected.to_string()));
        }
        Box::pin(async move {
            match &self.failure {
                None => Ok(()),
                Some(reason) => Err(UpdateError::VerificationFailed {
                    version: expected.to_string(),
                    reason: reason.clone(),
                }
                .into()),
            }
        })
    }
}

/// [`MigrationRunner`] that records its calls.
#[derive(Debug, Default)]
pub struct FakeMigrationRunner {
    failure: Option<String>,
    calls: Mutex<Vec<(u32, bool)>>,
}

impl FakeMigrationRunner {
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            calls: Mutex::default(),
        }
    }

    /// `(target, allow_revert)` per call.
    pub fn calls(&self) -> Vec<(u32, bool)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl MigrationRunner for FakeMigrationRunner {
    fn run_migration<'a>(
        &'a self,
        _fetcher: &'a dyn Fetcher,
        target: u32,
        allow_revert: bool,
    ) -> StepFuture<'a, ()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((target, allow_revert));
        }
        Box::pin(async move {
            match &self.failure {
                None => Ok(()),
                Some(reason) => Err(anyhow!("{reason}")),
            }
        })
    }
}

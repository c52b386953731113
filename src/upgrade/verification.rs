//! Checking a downloaded binary before it replaces the installed one.
//!
//! [`SmokeTest`] runs the new binary against a throwaway repository under
//! `<ipfs_dir>/update-staging`: `init`, `version`, and (for releases new enough to have
//! a usable daemon) a daemon started on loopback ports with a small add/cat round trip.
//! The whole run is bounded by [`VERIFY_TIMEOUT`].

use super::StepFuture;
use crate::config::{IPFS_PATH_ENV, UpdateConfig};
use crate::constants::{
    API_DIAL_ATTEMPTS, API_FILE_POLL_ATTEMPTS, API_FILE_POLL_DELAY_MS, DAEMON_CHECK_MIN_VERSION,
    MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS, VERIFY_TIMEOUT,
};
use crate::core::UpdateError;
use crate::fetch::parse_api_multiaddr;
use crate::utils::backoff::linear_delays;
use crate::utils::fs::make_executable;
use crate::version::{before_version, version_match};
use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info};

const PROBE_TEXT: &str = "hello world! This node should work";

/// Decides whether a binary is fit to install.
pub trait BinaryVerifier: Send + Sync {
    /// Check `binary`, which should report `expected` as its version.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::VerificationFailed`] describing the first failed check.
    fn verify<'a>(&'a self, binary: &'a Path, expected: &'a str) -> StepFuture<'a, ()>;
}

/// Exercises the binary in a scratch repository.
#[derive(Debug, Clone)]
pub struct SmokeTest {
    config: UpdateConfig,
    timeout: Duration,
}

impl SmokeTest {
    #[must_use]
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            config: config.clone(),
            timeout: VERIFY_TIMEOUT,
        }
    }

    /// Bound the whole run by `timeout` instead of the default five minutes.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, binary: &Path, expected: &str) -> Result<()> {
        make_executable(binary)?;

        let staging = self.config.staging_dir();
        tokio::fs::create_dir_all(&staging)
            .await
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        let repo = tempfile::Builder::new()
            .prefix("test")
            .tempdir_in(&staging)
            .context("Failed to create test repo directory")?;
        let repo = repo.path();

        info!("Testing new binary in {}", repo.display());
        run_ipfs(binary, repo, &["init"], None).await?;

        let output = run_ipfs(binary, repo, &["version"], None).await?;
        let reported = output.split_whitespace().last().unwrap_or_default();
        if !version_match(reported, expected) {
            bail!("version mismatch: expected {expected}, binary reports '{reported}'");
        }

        if before_version(DAEMON_CHECK_MIN_VERSION, expected) {
            info!("Skipping daemon tests for version {}", expected);
            return Ok(());
        }

        isolate_config(&repo.join("config")).await?;

        let mut daemon = Daemon::start(binary, repo)?;
        daemon.wait_ready().await?;

        let hash = run_ipfs(binary, repo, &["add", "-q"], Some(PROBE_TEXT.as_bytes())).await?;
        let hash = hash.trim();
        debug!("Added probe content as {}", hash);

        let content = run_ipfs(binary, repo, &["cat", hash], None).await?;
        if content != PROBE_TEXT {
            bail!("`ipfs cat {hash}` returned unexpected content: {content:?}");
        }

        let refs = run_ipfs(binary, repo, &["refs", "local"], None).await?;
        if !refs.lines().any(|line| line.trim() == hash) {
            bail!("`ipfs refs local` does not list {hash}");
        }

        daemon.stop().await
    }
}

impl BinaryVerifier for SmokeTest {
    fn verify<'a>(&'a self, binary: &'a Path, expected: &'a str) -> StepFuture<'a, ()> {
        Box::pin(async move {
            info!("Verifying new binary for {}", expected);
            let reason = match tokio::time::timeout(self.timeout, self.run(binary, expected)).await {
                Ok(Ok(())) => {
                    info!("New binary passed tests");
                    return Ok(());
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!("timed out after {}s", self.timeout.as_secs()),
            };
            Err(UpdateError::VerificationFailed {
                version: expected.to_string(),
                reason,
            }
            .into())
        })
    }
}

/// Run `binary args...` against `repo` and return its stdout.
async fn run_ipfs(binary: &Path, repo: &Path, args: &[&str], stdin: Option<&[u8]>) -> Result<String> {
    let mut child = Command::new(binary)
        .args(args)
        .env(IPFS_PATH_ENV, repo)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to run {}", binary.display()))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).await.context("Failed to write to stdin")?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        bail!(
            "`ipfs {}` exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Keep the test daemon off the network: loopback with OS-chosen ports, no gateway,
/// no bootstrap peers, no MDNS.
async fn isolate_config(path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    set_key(&mut config, &["Discovery", "MDNS", "Enabled"], json!(false))?;
    set_key(&mut config, &["Addresses", "API"], json!("/ip4/127.0.0.1/tcp/0"))?;
    set_key(&mut config, &["Addresses", "Gateway"], json!(""))?;
    set_key(&mut config, &["Addresses", "Swarm"], json!(["/ip4/127.0.0.1/tcp/0"]))?;
    set_key(&mut config, &["Bootstrap"], json!([]))?;

    let content = serde_json::to_string_pretty(&config)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn set_key(root: &mut Value, keys: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = keys.split_last() else {
        return Ok(());
    };

    let mut node = root;
    for key in parents {
        let object = node.as_object_mut().ok_or_else(|| anyhow!("config key {key} is not an object"))?;
        node = object.entry(*key).or_insert_with(|| json!({}));
    }
    node.as_object_mut()
        .ok_or_else(|| anyhow!("cannot set {} in a non-object", keys.join(".")))?
        .insert((*last).to_string(), value);
    Ok(())
}

/// A test daemon. Killed when dropped.
struct Daemon {
    child: Child,
    repo: PathBuf,
}

impl Daemon {
    fn start(binary: &Path, repo: &Path) -> Result<Self> {
        debug!("Starting test daemon");
        let child = Command::new(binary)
            .arg("daemon")
            .env(IPFS_PATH_ENV, repo)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to start daemon")?;

        Ok(Self {
            child,
            repo: repo.to_path_buf(),
        })
    }

    /// Wait for the daemon to write its `api` file, then for the API port to accept
    /// connections.
    async fn wait_ready(&mut self) -> Result<()> {
        let api_file = self.repo.join("api");
        let delays = linear_delays(Duration::from_millis(API_FILE_POLL_DELAY_MS), API_FILE_POLL_ATTEMPTS);

        for delay in delays {
            if api_file.exists() {
                break;
            }
            if let Some(status) = self.child.try_wait()? {
                bail!("daemon exited early with {status}");
            }
            tokio::time::sleep(delay).await;
        }
        if !api_file.exists() {
            bail!("daemon did not write {} in time", api_file.display());
        }

        let multiaddr = tokio::fs::read_to_string(&api_file).await?;
        let addr = parse_api_multiaddr(&multiaddr)?;
        debug!("Dialing test daemon at {}", addr);

        let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
            .take(API_DIAL_ATTEMPTS);
        Retry::spawn(strategy, || TcpStream::connect(addr.as_str()))
            .await
            .with_context(|| format!("daemon API at {addr} never accepted connections"))?;
        Ok(())
    }

    async fn stop(mut self) -> Result<()> {
        debug!("Stopping test daemon");
        self.child.kill().await.context("Failed to stop daemon")
    }
}

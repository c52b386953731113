use assert_cmd::Command;
use ipfs_update::config::UpdateConfig;
use ipfs_update::test_utils::{TestHttpServer, release_archive, unused_port};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a config that points the API at a closed port and the gateway at `gateway`.
async fn write_config(temp: &Path, gateway: &str) -> PathBuf {
    let config = UpdateConfig {
        ipfs_dir: temp.join("ipfs"),
        gateway_url: gateway.to_string(),
        api_url: format!("http://127.0.0.1:{}", unused_port()),
        max_retries: 1,
        ..UpdateConfig::default()
    };
    let path = temp.join("config.toml");
    config.save_to(&path).await.unwrap();
    path
}

fn ipfs_update(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ipfs-update").unwrap();
    cmd.arg("--config").arg(config).env_remove("RUST_LOG").env_remove("IPFS_DIST_PATH");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("ipfs-update").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("versions"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("revert"))
        .stdout(predicate::str::contains("--distpath"));
}

#[test]
fn test_unknown_command_fails() {
    let mut cmd = Command::cargo_bin("ipfs-update").unwrap();
    cmd.arg("frobnicate");
    cmd.assert().failure();
}

#[tokio::test]
async fn test_version_reports_none_without_binary() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:9").await;
    let empty = temp.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();

    ipfs_update(&config)
        .env("PATH", &empty)
        .arg("version")
        .assert()
        .success()
        .stdout("none\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_versions_lists_oldest_first() {
    let temp = TempDir::new().unwrap();
    let server = TestHttpServer::start(200, b"v0.18.0\nv0.17.0\nnot-a-version\nv0.18.1-rc1\n".to_vec()).await;
    let config = write_config(temp.path(), &server.url()).await;

    tokio::task::spawn_blocking(move || {
        ipfs_update(&config)
            .arg("versions")
            .assert()
            .success()
            .stdout("v0.17.0\nv0.18.0\nv0.18.1-rc1\n");
    })
    .await
    .unwrap();

    let request = server.last_request().await.unwrap();
    assert!(request.contains("/kubo/versions"), "unexpected request: {request}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_versions_fails_when_dist_unavailable() {
    let temp = TempDir::new().unwrap();
    let server = TestHttpServer::start(404, b"not found".to_vec()).await;
    let config = write_config(temp.path(), &server.url()).await;

    tokio::task::spawn_blocking(move || {
        ipfs_update(&config)
            .args(["--distpath", "/ipfs/QmMissing", "versions"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("error"));
    })
    .await
    .unwrap();

    let request = server.last_request().await.unwrap();
    assert!(request.contains("/ipfs/QmMissing/kubo/versions"), "unexpected request: {request}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_writes_binary() {
    let temp = TempDir::new().unwrap();
    let server = TestHttpServer::start(200, release_archive("kubo", "ipfs", b"fetched binary")).await;
    let config = write_config(temp.path(), &server.url()).await;
    let output = temp.path().join("ipfs-new");

    let out = output.clone();
    tokio::task::spawn_blocking(move || {
        ipfs_update(&config)
            .args(["fetch", "v0.18.1", "--output"])
            .arg(&out)
            .assert()
            .success()
            .stdout(predicate::str::contains("v0.18.1"));
    })
    .await
    .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), b"fetched binary");
}

#[tokio::test]
async fn test_fetch_refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &format!("http://127.0.0.1:{}", unused_port())).await;
    let output = temp.path().join("existing");
    std::fs::write(&output, b"keep me").unwrap();

    ipfs_update(&config)
        .args(["fetch", "v0.18.1", "--output"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");
}

#[tokio::test]
async fn test_revert_without_backups_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &format!("http://127.0.0.1:{}", unused_port())).await;

    ipfs_update(&config)
        .arg("revert")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no prior binary found"));
}

#[tokio::test]
async fn test_revert_abort_exits_cleanly() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &format!("http://127.0.0.1:{}", unused_port())).await;
    let old_bin = temp.path().join("ipfs").join("old-bin");
    std::fs::create_dir_all(&old_bin).unwrap();
    std::fs::write(old_bin.join("ipfs-v0.16.0"), b"a").unwrap();
    std::fs::write(old_bin.join("ipfs-v0.17.0"), b"b").unwrap();

    ipfs_update(&config)
        .arg("revert")
        .write_stdin("0\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("install which?"))
        .stdout(predicate::str::contains("aborted"));
    assert!(old_bin.join("ipfs-v0.16.0").exists());
}

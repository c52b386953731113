use crate::common::{Sandbox, fake_ipfs, read, release_fetcher};
use ipfs_update::core::UpdateError;
use ipfs_update::fetch::{FetchFuture, Fetcher};
use ipfs_update::test_utils::{FakeLocator, FakeMigrationRunner, FakeVerifier, write_script};
use ipfs_update::upgrade::{
    BinaryVerifier, Cancellation, InstallOutcome, InstallRequest, Installer, MigrationOutcome,
    MigrationRunner, SkipReason, StepFuture, UpdateLock,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn installer(
    sandbox: &Sandbox,
    fetcher: Arc<dyn Fetcher>,
    locator: FakeLocator,
    verifier: Arc<FakeVerifier>,
    runner: Arc<FakeMigrationRunner>,
) -> Installer {
    Installer::new(&sandbox.config, fetcher)
        .with_locator(Arc::new(locator))
        .with_verifier(verifier)
        .with_migration_runner(runner)
}

fn update_error(err: &anyhow::Error) -> &UpdateError {
    err.downcast_ref::<UpdateError>()
        .unwrap_or_else(|| panic!("expected an UpdateError, got: {err:#}"))
}

/// Never answers.
struct StallingFetcher;

impl Fetcher for StallingFetcher {
    fn name(&self) -> &str {
        "stalling"
    }

    fn fetch<'a>(&'a self, _path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        Box::pin(std::future::pending())
    }
}

/// Passes, but deletes the downloaded binary so the install copy fails.
struct VanishingVerifier;

impl BinaryVerifier for VanishingVerifier {
    fn verify<'a>(&'a self, binary: &'a Path, _expected: &'a str) -> StepFuture<'a, ()> {
        Box::pin(async move {
            std::fs::remove_file(binary)?;
            Ok(())
        })
    }
}

/// A migration that never finishes. `started` fires once it has been entered.
#[derive(Default)]
struct StallingRunner {
    started: Notify,
}

impl MigrationRunner for StallingRunner {
    fn run_migration<'a>(
        &'a self,
        _fetcher: &'a dyn Fetcher,
        _target: u32,
        _allow_revert: bool,
    ) -> StepFuture<'a, ()> {
        self.started.notify_one();
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn test_same_version_is_a_noop() {
    let sandbox = Sandbox::without_ipfs_dir();
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));
    let verifier = Arc::new(FakeVerifier::passing());

    let outcome = installer(
        &sandbox,
        fetcher.clone(),
        FakeLocator::new("v0.18.1"),
        verifier.clone(),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .install(&InstallRequest::new("v0.18.1"))
    .await
    .unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::AlreadyInstalled {
            version: "v0.18.1".to_string()
        }
    );
    assert!(fetcher.requests().is_empty(), "noop must not download");
    assert!(verifier.calls().is_empty());
    assert!(!sandbox.config.ipfs_dir.exists(), "noop must not create the ipfs dir");
}

#[tokio::test]
async fn test_downgrade_refused_before_download() {
    let sandbox = Sandbox::without_ipfs_dir();
    let fetcher = release_fetcher("v0.17.0", &fake_ipfs("v0.17.0", 12));

    let err = installer(
        &sandbox,
        fetcher.clone(),
        FakeLocator::new("v0.18.1"),
        Arc::new(FakeVerifier::passing()),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .install(&InstallRequest::new("v0.17.0"))
    .await
    .unwrap_err();

    assert!(matches!(
        update_error(&err),
        UpdateError::DowngradeRefused { current, target } if current == "v0.18.1" && target == "v0.17.0"
    ));
    assert!(fetcher.requests().is_empty());
    assert!(!sandbox.config.ipfs_dir.exists(), "a refused downgrade must not touch the disk");
}

#[tokio::test]
async fn test_downgrade_allowed_with_flag() {
    let sandbox = Sandbox::new();
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.18.1'");
    let fetcher = release_fetcher("v0.17.0", &fake_ipfs("v0.17.0", 12));

    let outcome = installer(
        &sandbox,
        fetcher,
        FakeLocator::new("v0.18.1").with_installed(sandbox.installed_path()),
        Arc::new(FakeVerifier::passing()),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .install(&InstallRequest::new("v0.17.0").with_allow_downgrade(true))
    .await
    .unwrap();

    assert!(matches!(outcome, InstallOutcome::Installed { ref version, .. } if version == "v0.17.0"));
    assert_eq!(sandbox.old_bin_entries(), vec!["ipfs-v0.18.1", "path-old"]);
}

#[tokio::test]
async fn test_verification_failure_leaves_install_untouched() {
    let sandbox = Sandbox::new();
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.17.0'");
    let before = read(&sandbox.installed_path());
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));
    let runner = Arc::new(FakeMigrationRunner::succeeding());

    let err = installer(
        &sandbox,
        fetcher,
        FakeLocator::new("v0.17.0").with_installed(sandbox.installed_path()),
        Arc::new(FakeVerifier::failing("daemon did not start")),
        runner.clone(),
    )
    .install(&InstallRequest::new("v0.18.1"))
    .await
    .unwrap_err();

    assert!(matches!(update_error(&err), UpdateError::VerificationFailed { .. }));
    assert_eq!(read(&sandbox.installed_path()), before);
    assert!(sandbox.old_bin_entries().is_empty(), "nothing may be stashed before verification");
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_upgrade_stashes_installs_and_migrates() {
    let sandbox = Sandbox::new();
    sandbox.set_repo_version(12);
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.17.0'");
    let old = read(&sandbox.installed_path());
    let new = fake_ipfs("v0.18.1", 13);
    let fetcher = release_fetcher("v0.18.1", &new);
    let verifier = Arc::new(FakeVerifier::passing());
    let runner = Arc::new(FakeMigrationRunner::succeeding());

    let outcome = installer(
        &sandbox,
        fetcher,
        FakeLocator::new("v0.17.0").with_installed(sandbox.installed_path()),
        verifier.clone(),
        runner.clone(),
    )
    .install(&InstallRequest::new("v0.18.1"))
    .await
    .unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::Installed {
            version: "v0.18.1".to_string(),
            path: std::path::absolute(sandbox.installed_path()).unwrap(),
            migration: MigrationOutcome::Migrated { from: 12, to: 13 },
        }
    );
    assert_eq!(read(&sandbox.installed_path()), new.as_bytes());
    assert_eq!(read(&sandbox.config.old_bin_dir().join("ipfs-v0.17.0")), old);
    assert_eq!(verifier.calls().len(), 1);
    assert_eq!(verifier.calls()[0].1, "v0.18.1");
    assert_eq!(runner.calls(), vec![(13, true)]);
    assert!(
        UpdateLock::acquire(&sandbox.config.lock_path()).is_ok(),
        "lock must be released"
    );
}

#[tokio::test]
async fn test_migration_failure_restores_previous_binary() {
    let sandbox = Sandbox::new();
    sandbox.set_repo_version(12);
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.17.0'");
    let old = read(&sandbox.installed_path());
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));

    let err = installer(
        &sandbox,
        fetcher,
        FakeLocator::new("v0.17.0").with_installed(sandbox.installed_path()),
        Arc::new(FakeVerifier::passing()),
        Arc::new(FakeMigrationRunner::failing("migration 12-to-13 failed")),
    )
    .install(&InstallRequest::new("v0.18.1"))
    .await
    .unwrap_err();

    assert!(matches!(update_error(&err), UpdateError::MigrationRunFailed { target: 13, .. }));
    assert_eq!(read(&sandbox.installed_path()), old, "previous binary must be restored byte for byte");
    assert!(!sandbox.config.old_bin_dir().join("ipfs-v0.17.0").exists());
}

#[tokio::test]
async fn test_first_install_uses_install_dir() {
    let sandbox = Sandbox::new();
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));

    let outcome = installer(
        &sandbox,
        fetcher,
        FakeLocator::new("none").with_install_dir(sandbox.bin_dir()),
        Arc::new(FakeVerifier::passing()),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .install(&InstallRequest::new("v0.18.1"))
    .await
    .unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::Installed {
            version: "v0.18.1".to_string(),
            path: sandbox.installed_path(),
            migration: MigrationOutcome::Skipped(SkipReason::NoRepo),
        }
    );
    assert!(sandbox.installed_path().exists());
    assert!(sandbox.old_bin_entries().is_empty());
}

#[tokio::test]
async fn test_no_check_skips_verifier() {
    let sandbox = Sandbox::new();
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));
    let verifier = Arc::new(FakeVerifier::failing("must not run"));

    installer(
        &sandbox,
        fetcher,
        FakeLocator::new("none").with_install_dir(sandbox.bin_dir()),
        verifier.clone(),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .install(&InstallRequest::new("v0.18.1").with_no_check(true))
    .await
    .unwrap();

    assert!(verifier.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_during_download() {
    let sandbox = Sandbox::new();
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.17.0'");
    let before = read(&sandbox.installed_path());
    let (trigger, cancel) = Cancellation::channel();

    let installer = installer(
        &sandbox,
        Arc::new(StallingFetcher),
        FakeLocator::new("v0.17.0").with_installed(sandbox.installed_path()),
        Arc::new(FakeVerifier::passing()),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .with_cancellation(cancel);

    let request = InstallRequest::new("v0.18.1");
    let install = installer.install(&request);
    let fire = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(install, fire);

    let err = result.unwrap_err();
    assert!(matches!(update_error(&err), UpdateError::Cancelled { stage } if stage == "download"));
    assert_eq!(read(&sandbox.installed_path()), before);
    assert!(sandbox.old_bin_entries().is_empty());
}

#[tokio::test]
async fn test_concurrent_install_is_refused() {
    let sandbox = Sandbox::new();
    let _held = UpdateLock::acquire(&sandbox.config.lock_path()).unwrap();

    let err = installer(
        &sandbox,
        release_fetcher("v0.18.1", "unused"),
        FakeLocator::new("v0.17.0"),
        Arc::new(FakeVerifier::passing()),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .install(&InstallRequest::new("v0.18.1"))
    .await
    .unwrap_err();

    assert!(matches!(update_error(&err), UpdateError::LockBusy { .. }));
}

#[tokio::test]
async fn test_install_failure_restores_previous_binary() {
    let sandbox = Sandbox::new();
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.17.0'");
    let old = read(&sandbox.installed_path());
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));
    let runner = Arc::new(FakeMigrationRunner::succeeding());

    let err = Installer::new(&sandbox.config, fetcher)
        .with_locator(Arc::new(FakeLocator::new("v0.17.0").with_installed(sandbox.installed_path())))
        .with_verifier(Arc::new(VanishingVerifier))
        .with_migration_runner(runner.clone())
        .install(&InstallRequest::new("v0.18.1"))
        .await
        .unwrap_err();

    assert!(matches!(update_error(&err), UpdateError::InstallIo { .. }));
    assert_eq!(read(&sandbox.installed_path()), old, "previous binary must be restored byte for byte");
    assert!(!sandbox.config.old_bin_dir().join("ipfs-v0.17.0").exists());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_during_migration_check_restores_previous_binary() {
    let sandbox = Sandbox::new();
    sandbox.set_repo_version(12);
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.17.0'");
    let old = read(&sandbox.installed_path());
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));
    let (trigger, cancel) = Cancellation::channel();
    let runner = Arc::new(StallingRunner::default());

    let installer = Installer::new(&sandbox.config, fetcher)
        .with_locator(Arc::new(FakeLocator::new("v0.17.0").with_installed(sandbox.installed_path())))
        .with_verifier(Arc::new(FakeVerifier::passing()))
        .with_migration_runner(runner.clone())
        .with_cancellation(cancel);

    let request = InstallRequest::new("v0.18.1");
    let install = installer.install(&request);
    let fire = async {
        runner.started.notified().await;
        trigger.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(install, fire);

    let err = result.unwrap_err();
    assert!(matches!(update_error(&err), UpdateError::Cancelled { stage } if stage == "migration check"));
    assert_eq!(read(&sandbox.installed_path()), old, "previous binary must be restored byte for byte");
    assert!(!sandbox.config.old_bin_dir().join("ipfs-v0.17.0").exists());
}

#[tokio::test]
async fn test_first_install_without_install_dir_fails_cleanly() {
    let sandbox = Sandbox::new();
    let fetcher = release_fetcher("v0.18.1", &fake_ipfs("v0.18.1", 13));

    let err = installer(
        &sandbox,
        fetcher,
        FakeLocator::new("none"),
        Arc::new(FakeVerifier::passing()),
        Arc::new(FakeMigrationRunner::succeeding()),
    )
    .install(&InstallRequest::new("v0.18.1"))
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("no install directory"), "unexpected error: {err:#}");
    assert!(!sandbox.installed_path().exists());
    assert!(sandbox.old_bin_entries().is_empty());
}

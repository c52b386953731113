use crate::common::{Sandbox, read, write_fake_ipfs};
use ipfs_update::core::UpdateError;
use ipfs_update::test_utils::{FakeMigrationRunner, StaticFetcher, write_script};
use ipfs_update::upgrade::{Installer, MigrationOutcome, SkipReason, StashManager};
use std::io::Cursor;
use std::sync::Arc;

fn installer(sandbox: &Sandbox, runner: Arc<FakeMigrationRunner>) -> Installer {
    Installer::new(&sandbox.config, Arc::new(StaticFetcher::new())).with_migration_runner(runner)
}

#[tokio::test]
async fn test_revert_restores_stashed_binary() {
    let sandbox = Sandbox::new();
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.17.0'");
    let old = read(&sandbox.installed_path());

    let manager = StashManager::new(&sandbox.config);
    manager.stash(Some(&sandbox.installed_path()), "v0.17.0", false).unwrap();
    write_script(&sandbox.installed_path(), "echo 'ipfs version 0.18.1'");

    let stash = manager.select_for_revert(Cursor::new(""), std::io::sink()).unwrap();
    let runner = Arc::new(FakeMigrationRunner::succeeding());
    let (restored, migration) = installer(&sandbox, runner.clone()).revert(&stash).await.unwrap();

    assert_eq!(restored, std::path::absolute(sandbox.installed_path()).unwrap());
    assert_eq!(read(&sandbox.installed_path()), old);
    assert_eq!(migration, MigrationOutcome::Skipped(SkipReason::NoRepo));
    assert!(!stash.exists(), "consumed backup must be removed");
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_revert_migrates_repo_back() {
    let sandbox = Sandbox::new();
    sandbox.set_repo_version(13);
    write_fake_ipfs(&sandbox.installed_path(), "v0.17.0", 12);

    let manager = StashManager::new(&sandbox.config);
    manager.stash(Some(&sandbox.installed_path()), "v0.17.0", false).unwrap();
    write_script(&sandbox.installed_path(), "exit 0");

    let runner = Arc::new(FakeMigrationRunner::succeeding());
    let (_, migration) = installer(&sandbox, runner.clone())
        .revert(&manager.stash_path("v0.17.0"))
        .await
        .unwrap();

    assert_eq!(migration, MigrationOutcome::Migrated { from: 13, to: 12 });
    assert_eq!(runner.calls(), vec![(12, true)]);
}

#[tokio::test]
async fn test_revert_picks_selected_stash() {
    let sandbox = Sandbox::new();
    let manager = StashManager::new(&sandbox.config);
    for version in ["v0.16.0", "v0.17.0"] {
        write_script(&sandbox.installed_path(), &format!("echo '{version}'"));
        manager.stash(Some(&sandbox.installed_path()), version, false).unwrap();
    }
    let wanted = read(&manager.stash_path("v0.16.0"));

    let mut prompt = Vec::new();
    let stash = manager.select_for_revert(Cursor::new("1\n"), &mut prompt).unwrap();
    let prompt = String::from_utf8(prompt).unwrap();
    assert!(prompt.contains("install which? (0 to exit)"));

    installer(&sandbox, Arc::new(FakeMigrationRunner::succeeding()))
        .revert(&stash)
        .await
        .unwrap();

    assert_eq!(read(&sandbox.installed_path()), wanted);
    assert!(manager.stash_path("v0.17.0").exists(), "other backups are kept");
}

#[test]
fn test_revert_without_stash() {
    let sandbox = Sandbox::new();
    let manager = StashManager::new(&sandbox.config);

    let err = manager.select_for_revert(Cursor::new(""), std::io::sink()).unwrap_err();
    assert!(matches!(err.downcast_ref::<UpdateError>(), Some(UpdateError::NoStashFound { .. })));
}

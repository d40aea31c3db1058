//! Tests for restore validation, sequencing, and rollback.

use tempfile::TempDir;

use super::fixtures::{
    SERVER, TOKEN, backups_root, bare_manifest, command_strings, engine_at, managed_manifest,
    record, seed_backup, step_names,
};
use crate::backup::{BackupStore, BackupStoreError, MANIFEST_FILE_NAME, RestoreError};
use crate::gate::SafetyGate;
use crate::record::ServerMode;
use crate::report::{StepResult, overall_success};
use crate::test_support::ScriptedRunner;

#[tokio::test]
async fn managed_restore_runs_the_full_sequence() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    seed_backup(&BackupStore::new(root.clone()), &managed_manifest());
    let runner = ScriptedRunner::new();
    for _ in 0..8 {
        runner.push_success();
    }
    let engine = engine_at(root, runner.clone());

    let steps = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::Open)
        .await
        .unwrap_or_else(|err| panic!("restore should run: {err}"));

    assert_eq!(
        step_names(&steps),
        [
            "upload-artifacts",
            "stop-stack",
            "start-database",
            "restore-database",
            "extract-config",
            "start-stack",
        ]
    );
    assert!(overall_success(&steps));

    let commands = command_strings(&runner);
    assert_eq!(commands.len(), 8, "2 uploads, 5 phases, cleanup");
    assert!(commands.last().is_some_and(|cmd| cmd.contains("rm -f")));
}

#[tokio::test]
async fn mid_restore_failure_rolls_the_stack_back() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    seed_backup(&BackupStore::new(root.clone()), &managed_manifest());
    let runner = ScriptedRunner::new();
    runner.push_success(); // upload database
    runner.push_success(); // upload config
    runner.push_success(); // stop stack
    runner.push_success(); // start database
    runner.push_failure(1); // restore database
    runner.push_success(); // rollback start
    let engine = engine_at(root, runner.clone());

    let steps = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::Open)
        .await
        .unwrap_or_else(|err| panic!("mid-sequence failure stays in the log: {err}"));

    assert_eq!(
        step_names(&steps),
        [
            "upload-artifacts",
            "stop-stack",
            "start-database",
            "restore-database",
        ]
    );
    assert!(steps.last().is_some_and(StepResult::failed));
    assert!(!overall_success(&steps));

    let commands = command_strings(&runner);
    assert_eq!(commands.len(), 6, "commands: {commands:?}");
    assert!(
        commands
            .last()
            .is_some_and(|cmd| cmd.ends_with("cd /opt/platform && docker compose up -d")),
        "rollback must start everything back up: {commands:?}"
    );
}

#[tokio::test]
async fn safe_mode_refuses_before_any_work() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    seed_backup(&BackupStore::new(root.clone()), &managed_manifest());
    let runner = ScriptedRunner::new();
    let engine = engine_at(root, runner.clone());

    let err = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::SafeMode)
        .await
        .expect_err("safe mode must refuse the restore");

    assert!(matches!(err, RestoreError::SafeMode));
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn traversal_tokens_fail_closed() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    let runner = ScriptedRunner::new();
    let engine = engine_at(root.clone(), runner.clone());

    let err = engine
        .restore(&record(ServerMode::Managed), "../../etc", SafetyGate::Open)
        .await
        .expect_err("traversal token must be rejected");

    assert!(matches!(
        err,
        RestoreError::Store(BackupStoreError::Traversal { .. })
    ));
    assert!(runner.invocations().is_empty(), "no network access");
    assert!(!root.as_std_path().exists(), "no filesystem access");
}

#[tokio::test]
async fn absent_manifest_is_a_distinct_error() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let runner = ScriptedRunner::new();
    let engine = engine_at(backups_root(&tmp), runner.clone());

    let err = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::Open)
        .await
        .expect_err("no manifest, no restore");

    assert!(matches!(err, RestoreError::ManifestAbsent { .. }));
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn missing_artifacts_block_the_restore() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    let store = BackupStore::new(root.clone());
    let dir = store
        .create_backup_dir(SERVER, TOKEN)
        .unwrap_or_else(|err| panic!("create dir: {err}"));
    std::fs::write(dir.join("database.sql.gz").as_std_path(), b"dump")
        .unwrap_or_else(|err| panic!("seed artifact: {err}"));
    store
        .write_manifest(&managed_manifest())
        .unwrap_or_else(|err| panic!("write manifest: {err}"));
    let runner = ScriptedRunner::new();
    let engine = engine_at(root, runner.clone());

    let err = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::Open)
        .await
        .expect_err("incomplete backup must be rejected");

    match err {
        RestoreError::ArtifactsMissing { files, .. } => {
            assert_eq!(files, ["config.tar.gz"]);
        }
        other => panic!("expected ArtifactsMissing, got {other:?}"),
    }
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn foreign_manifest_is_rejected() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    let store = BackupStore::new(root.clone());
    let dir = store
        .create_backup_dir(SERVER, TOKEN)
        .unwrap_or_else(|err| panic!("create dir: {err}"));
    let mut foreign = managed_manifest();
    foreign.server_name = String::from("other-01");
    let rendered = serde_json::to_string(&foreign)
        .unwrap_or_else(|err| panic!("render foreign manifest: {err}"));
    std::fs::write(dir.join(MANIFEST_FILE_NAME).as_std_path(), rendered)
        .unwrap_or_else(|err| panic!("seed foreign manifest: {err}"));
    let engine = engine_at(root, ScriptedRunner::new());

    let err = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::Open)
        .await
        .expect_err("a manifest for another server must be rejected");

    match err {
        RestoreError::ManifestMismatch { manifest_server, .. } => {
            assert_eq!(manifest_server, "other-01");
        }
        other => panic!("expected ManifestMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_failure_leaves_the_server_untouched() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    seed_backup(&BackupStore::new(root.clone()), &managed_manifest());
    let runner = ScriptedRunner::new();
    runner.push_failure(1); // first upload
    let engine = engine_at(root, runner.clone());

    let steps = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::Open)
        .await
        .unwrap_or_else(|err| panic!("upload failure stays in the log: {err}"));

    assert_eq!(step_names(&steps), ["upload-artifacts"]);
    assert!(steps.last().is_some_and(StepResult::failed));

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert!(
        invocations.iter().all(|call| call.program == "scp"),
        "no remote command may run after a failed upload"
    );
}

#[tokio::test]
async fn bare_restore_extracts_without_stopping_services() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    seed_backup(&BackupStore::new(root.clone()), &bare_manifest());
    let runner = ScriptedRunner::new();
    runner.push_success(); // upload archive
    runner.push_success(); // extract
    runner.push_success(); // stage cleanup
    let engine = engine_at(root, runner.clone());

    let steps = engine
        .restore(&record(ServerMode::Bare), TOKEN, SafetyGate::Open)
        .await
        .unwrap_or_else(|err| panic!("bare restore should run: {err}"));

    assert_eq!(step_names(&steps), ["upload-artifacts", "extract-archive"]);
    assert!(overall_success(&steps));

    let commands = command_strings(&runner);
    assert!(
        commands
            .get(1)
            .is_some_and(|cmd| cmd.contains("tar xzf") && cmd.contains("-C /"))
    );
    assert!(
        !commands.iter().any(|cmd| cmd.contains("docker compose")),
        "bare restore never touches the stack: {commands:?}"
    );
}

#[tokio::test]
async fn restore_follows_the_manifest_mode() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = backups_root(&tmp);
    seed_backup(&BackupStore::new(root.clone()), &bare_manifest());
    let runner = ScriptedRunner::new();
    runner.push_success(); // upload archive
    runner.push_success(); // extract
    runner.push_success(); // stage cleanup
    let engine = engine_at(root, runner.clone());

    // The record claims managed; the manifest knows better.
    let steps = engine
        .restore(&record(ServerMode::Managed), TOKEN, SafetyGate::Open)
        .await
        .unwrap_or_else(|err| panic!("restore should run: {err}"));

    assert_eq!(step_names(&steps), ["upload-artifacts", "extract-archive"]);
    let commands = command_strings(&runner);
    assert!(
        !commands.iter().any(|cmd| cmd.contains("docker compose")),
        "manifest mode selects the procedure: {commands:?}"
    );
}

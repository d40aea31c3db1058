//! Behavioural coverage for the maintenance engine against live endpoints.
//!
//! The health endpoint is a real TCP listener speaking just enough HTTP for
//! the probe, the update phase runs through fake ssh scripts, and vendor
//! phases run against the scripted provider double.

#[path = "common/fixtures.rs"]
mod fixtures;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use varta::test_support::ScriptedProvider;
use varta::{
    MaintenanceConfig, MaintenanceOptions, Maintainer, NullProvider, ServerIdentity, ServerMode,
    ServerRecord, ServerStatus, SshChannel, StepOutcome, StepResult, TokioProcessRunner,
    overall_success,
};

const FAKE_SSH_OK: &str = "#!/bin/sh\nexit 0\n";
const FAKE_SSH_BROKEN: &str = "#!/bin/sh\necho 'E: unmet dependencies' >&2\nexit 100\n";

async fn serve_health() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind health listener: {err}"));
    let port = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener address: {err}"))
        .port();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut request = [0_u8; 1024];
            socket.read(&mut request).await.ok();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await
                .ok();
            socket.shutdown().await.ok();
        }
    });
    (port, handle)
}

/// Binds and immediately frees a port so probes fail with connection refused.
async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind throwaway listener: {err}"));
    listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener address: {err}"))
        .port()
}

fn config(port: u16) -> MaintenanceConfig {
    MaintenanceConfig {
        health_port: port,
        health_path: String::from("/health"),
        health_attempts: 2,
        health_interval_secs: 0,
        status_attempts: 3,
        status_interval_secs: 0,
        reboot_settle_secs: 0,
    }
}

fn maintainer(ssh_script: &str, config: MaintenanceConfig) -> Maintainer<TokioProcessRunner> {
    let channel = SshChannel::with_process_runner(fixtures::channel_config(ssh_script, "scp"))
        .unwrap_or_else(|err| panic!("channel: {err}"));
    Maintainer::new(channel, config)
}

fn vendor_record(name: &str, mode: ServerMode) -> ServerRecord {
    let mut record = fixtures::manual_record(name, mode);
    record.identity = ServerIdentity::Vendor(String::from("srv-1234"));
    record
}

fn outcomes(steps: &[StepResult]) -> Vec<StepOutcome> {
    steps.iter().map(|step| step.outcome).collect()
}

#[tokio::test]
async fn healthy_manual_server_completes_every_phase() {
    let (port, server) = serve_health().await;
    let bin = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let ssh = fixtures::write_script(&bin, "fake-ssh", FAKE_SSH_OK);
    let engine = maintainer(ssh.as_str(), config(port));
    let record = fixtures::manual_record("web-01", ServerMode::Managed);

    let steps = engine
        .maintain(&NullProvider, &record, &MaintenanceOptions::default())
        .await;

    assert_eq!(
        outcomes(&steps),
        [
            StepOutcome::Skipped,
            StepOutcome::Success,
            StepOutcome::Success,
            StepOutcome::Skipped,
            StepOutcome::Success,
        ],
        "steps: {steps:?}"
    );
    assert!(overall_success(&steps));
    server.abort();
}

#[tokio::test]
async fn vendor_server_reboots_and_comes_back() {
    let (port, server) = serve_health().await;
    let bin = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let ssh = fixtures::write_script(&bin, "fake-ssh", FAKE_SSH_OK);
    let engine = maintainer(ssh.as_str(), config(port));
    let record = vendor_record("web-01", ServerMode::Managed);

    let provider = ScriptedProvider::new();
    provider.push_status(ServerStatus::Running);
    provider.push_status(ServerStatus::Provisioning);
    provider.push_status(ServerStatus::Running);

    let steps = engine
        .maintain(&provider, &record, &MaintenanceOptions::default())
        .await;

    assert_eq!(outcomes(&steps), [StepOutcome::Success; 5], "steps: {steps:?}");
    assert!(overall_success(&steps));
    assert!(provider.calls().contains(&"reboot_server"));
    server.abort();
}

#[tokio::test]
async fn unreachable_service_fails_checks_without_derailing_the_run() {
    let port = refused_port().await;
    let bin = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let ssh = fixtures::write_script(&bin, "fake-ssh", FAKE_SSH_OK);
    let engine = maintainer(ssh.as_str(), config(port));
    let record = fixtures::manual_record("web-01", ServerMode::Managed);

    let steps = engine
        .maintain(&NullProvider, &record, &MaintenanceOptions::default())
        .await;

    assert_eq!(
        outcomes(&steps),
        [
            StepOutcome::Skipped,
            StepOutcome::Success,
            StepOutcome::Failure,
            StepOutcome::Skipped,
            StepOutcome::Failure,
        ],
        "steps: {steps:?}"
    );
    assert!(!overall_success(&steps));
    let health = steps
        .get(2)
        .unwrap_or_else(|| panic!("health step missing"));
    assert!(
        health
            .hint
            .as_deref()
            .is_some_and(|hint| hint.contains("service logs"))
    );
}

#[tokio::test]
async fn broken_update_aborts_the_remaining_phases() {
    let (port, server) = serve_health().await;
    let bin = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let ssh = fixtures::write_script(&bin, "fake-ssh", FAKE_SSH_BROKEN);
    let engine = maintainer(ssh.as_str(), config(port));
    let record = fixtures::manual_record("web-01", ServerMode::Managed);

    let steps = engine
        .maintain(&NullProvider, &record, &MaintenanceOptions::default())
        .await;

    assert_eq!(
        outcomes(&steps),
        [
            StepOutcome::Skipped,
            StepOutcome::Failure,
            StepOutcome::Skipped,
            StepOutcome::Skipped,
            StepOutcome::Skipped,
        ],
        "steps: {steps:?}"
    );
    let update = steps.get(1).unwrap_or_else(|| panic!("update step missing"));
    assert!(
        update
            .error
            .as_deref()
            .is_some_and(|error| error.contains("exit status 100"))
    );
    assert!(!overall_success(&steps));
    server.abort();
}

#[tokio::test]
async fn skip_reboot_still_runs_the_final_check_against_the_live_service() {
    let (port, server) = serve_health().await;
    let bin = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let ssh = fixtures::write_script(&bin, "fake-ssh", FAKE_SSH_OK);
    let engine = maintainer(ssh.as_str(), config(port));
    let record = vendor_record("web-01", ServerMode::Managed);

    let provider = ScriptedProvider::new();
    provider.push_status(ServerStatus::Running);
    let options = MaintenanceOptions { skip_reboot: true };

    let steps = engine.maintain(&provider, &record, &options).await;

    assert_eq!(
        outcomes(&steps),
        [
            StepOutcome::Success,
            StepOutcome::Success,
            StepOutcome::Success,
            StepOutcome::Skipped,
            StepOutcome::Success,
        ],
        "steps: {steps:?}"
    );
    assert_eq!(provider.calls(), ["server_status"]);
    assert!(overall_success(&steps));
    server.abort();
}

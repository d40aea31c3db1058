//! Behavioural coverage for the supervised subprocess channel.
//!
//! These tests exercise the real [`TokioProcessRunner`] against `sh`, so
//! they cover the supervision behaviour unit tests cannot: stream capture,
//! watchdog escalation, and environment filtering of live children.

use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use varta::channel::CAPTURE_CAP;
use varta::test_support::EnvGuard;
use varta::{
    ChannelConfig, ChannelError, CommandRunner, ProcessLimits, SshChannel, TokioProcessRunner,
};

fn sh_args(command: &str) -> Vec<OsString> {
    vec![OsString::from("-c"), OsString::from(command)]
}

fn limits() -> ProcessLimits {
    ProcessLimits::with_timeout(Duration::from_secs(10))
}

fn channel_config(ssh_bin: &str, keygen_bin: &str) -> ChannelConfig {
    ChannelConfig {
        ssh_bin: String::from(ssh_bin),
        scp_bin: String::from("scp"),
        keygen_bin: String::from(keygen_bin),
        ssh_user: String::from("root"),
        connect_timeout_secs: 10,
    }
}

fn write_script(tmp: &TempDir, name: &str, body: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(tmp.path().join(name))
        .unwrap_or_else(|err| panic!("script path should be utf8: {}", err.display()));
    std::fs::write(&path, body).unwrap_or_else(|err| panic!("write script: {err}"));
    let mut perms = std::fs::metadata(&path)
        .unwrap_or_else(|err| panic!("script metadata: {err}"))
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap_or_else(|err| panic!("chmod script: {err}"));
    path
}

#[tokio::test]
async fn exit_codes_and_streams_are_captured() {
    let runner = TokioProcessRunner;
    let output = runner
        .run("sh", &sh_args("echo out; echo err >&2; exit 3"), limits())
        .await
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert_eq!(output.exit_code, Some(3));
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
    assert!(!output.timed_out);
    assert!(!output.is_success());
}

#[tokio::test]
async fn successful_commands_report_success() {
    let runner = TokioProcessRunner;
    let output = runner
        .run("sh", &sh_args("exit 0"), limits())
        .await
        .unwrap_or_else(|err| panic!("run: {err}"));
    assert!(output.is_success());
}

#[tokio::test]
async fn captured_output_stops_at_the_cap() {
    let runner = TokioProcessRunner;
    // Emits twice the cap; the child must still drain and exit cleanly.
    let output = runner
        .run(
            "sh",
            &sh_args("head -c 2097152 /dev/zero | tr '\\0' 'x'"),
            limits(),
        )
        .await
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert!(output.is_success(), "stderr: {}", output.stderr);
    assert_eq!(output.stdout.len(), CAPTURE_CAP);
}

#[tokio::test]
async fn watchdog_terminates_runaway_commands() {
    let runner = TokioProcessRunner;
    let budget = ProcessLimits {
        timeout: Duration::from_millis(200),
        grace: Duration::from_millis(200),
        capture_cap: CAPTURE_CAP,
    };
    let output = runner
        .run("sh", &sh_args("sleep 30"), budget)
        .await
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert!(output.timed_out);
    assert_eq!(output.exit_code, None);
    assert!(output.stderr.contains("terminated by watchdog"));
}

#[tokio::test]
async fn missing_binaries_fail_to_spawn() {
    let runner = TokioProcessRunner;
    let err = runner
        .run("varta-no-such-binary", &[], limits())
        .await
        .expect_err("missing binary should not spawn");
    assert!(matches!(err, ChannelError::Spawn { .. }));
}

#[tokio::test]
async fn credential_variables_never_reach_children() {
    let _guard = EnvGuard::set_vars(&[
        ("VARTA_SMOKE_TOKEN", "super-secret"),
        ("VARTA_SMOKE_MARKER", "visible"),
    ])
    .await;

    let runner = TokioProcessRunner;
    let command = "echo \"marker:${VARTA_SMOKE_MARKER:-none} token:${VARTA_SMOKE_TOKEN:-none}\"";
    let output = runner
        .run("sh", &sh_args(command), limits())
        .await
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert_eq!(output.stdout.trim(), "marker:visible token:none");
}

#[tokio::test]
async fn invalid_addresses_are_rejected_before_spawning() {
    let channel = SshChannel::with_process_runner(channel_config("ssh", "ssh-keygen"))
        .unwrap_or_else(|err| panic!("channel: {err}"));
    let err = channel
        .run_command("not-an-ip", "true")
        .await
        .expect_err("invalid address should fail");
    assert!(matches!(err, ChannelError::InvalidAddress { .. }));
}

#[tokio::test]
async fn rejected_remote_paths_never_reach_scp() {
    let channel = SshChannel::with_process_runner(channel_config("ssh", "ssh-keygen"))
        .unwrap_or_else(|err| panic!("channel: {err}"));
    let err = channel
        .upload("203.0.113.9", Utf8Path::new("/tmp/file"), "/tmp/x;rm -rf /")
        .await
        .expect_err("shell metacharacters should be rejected");
    assert!(matches!(err, ChannelError::InvalidRemotePath { .. }));
}

#[tokio::test]
async fn ssh_arguments_carry_user_host_and_command() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let script = write_script(&tmp, "echo-args", "#!/bin/sh\necho \"$@\"\n");

    let channel = SshChannel::with_process_runner(channel_config(script.as_str(), "ssh-keygen"))
        .unwrap_or_else(|err| panic!("channel: {err}"));
    let output = channel
        .run_command("203.0.113.9", "systemctl is-active platform")
        .await
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert!(output.is_success(), "stderr: {}", output.stderr);
    assert!(output.stdout.contains("BatchMode=yes"));
    assert!(output.stdout.contains("root@203.0.113.9"));
    assert!(output.stdout.contains("systemctl is-active platform"));
}

#[tokio::test]
async fn stale_host_keys_are_dropped_and_retried_once() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let state = tmp.path().join("first-call-done");
    let body = format!(
        "#!/bin/sh\n\
         if [ -f {state} ]; then echo recovered; exit 0; fi\n\
         touch {state}\n\
         echo 'REMOTE HOST IDENTIFICATION HAS CHANGED' >&2\n\
         exit 255\n",
        state = state.display(),
    );
    let script = write_script(&tmp, "fake-ssh", &body);

    // `true` stands in for ssh-keygen so the key drop always succeeds.
    let channel = SshChannel::with_process_runner(channel_config(script.as_str(), "true"))
        .unwrap_or_else(|err| panic!("channel: {err}"));
    let output = channel
        .run_command("203.0.113.9", "uptime")
        .await
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert!(output.is_success(), "stderr: {}", output.stderr);
    assert_eq!(output.stdout.trim(), "recovered");
}

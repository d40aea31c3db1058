//! Behavioural smoke tests for the CLI entrypoint.
//!
//! Commands run against the real binary with the record store pointed at a
//! temp file, so nothing touches the operator's fleet or reaches a network.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn records_path(tmp: &TempDir) -> std::path::PathBuf {
    tmp.path().join("servers.json")
}

#[test]
fn bare_invocation_prints_usage_and_fails() {
    let mut cmd = cargo_bin_cmd!("varta");
    cmd.assert().code(2).stderr(contains("Usage"));
}

#[test]
fn register_then_servers_round_trips_through_the_store() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));

    let mut register = cargo_bin_cmd!("varta");
    register.env("VARTA_RECORDS_PATH", records_path(&tmp));
    register.args(["register", "web-01", "--ip", "203.0.113.9"]);
    register
        .assert()
        .success()
        .stdout(contains("registered web-01 at 203.0.113.9"));

    let mut servers = cargo_bin_cmd!("varta");
    servers.env("VARTA_RECORDS_PATH", records_path(&tmp));
    servers.args(["servers"]);
    servers
        .assert()
        .success()
        .stdout(contains("web-01"))
        .stdout(contains("203.0.113.9"))
        .stdout(contains("managed"));
}

#[test]
fn duplicate_registration_is_refused() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));

    let mut first = cargo_bin_cmd!("varta");
    first.env("VARTA_RECORDS_PATH", records_path(&tmp));
    first.args(["register", "web-01", "--ip", "203.0.113.9"]);
    first.assert().success();

    let mut second = cargo_bin_cmd!("varta");
    second.env("VARTA_RECORDS_PATH", records_path(&tmp));
    second.args(["register", "web-01", "--ip", "203.0.113.10"]);
    second
        .assert()
        .code(1)
        .stderr(contains("server web-01 is already registered"));
}

#[test]
fn register_rejects_a_malformed_address() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let mut cmd = cargo_bin_cmd!("varta");
    cmd.env("VARTA_RECORDS_PATH", records_path(&tmp));
    cmd.args(["register", "web-01", "--ip", "not-an-ip"]);
    cmd.assert().code(1).stderr(contains("invalid server address"));
}

#[test]
fn backup_of_an_unknown_server_names_the_problem() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let mut cmd = cargo_bin_cmd!("varta");
    cmd.env("VARTA_RECORDS_PATH", records_path(&tmp));
    cmd.args(["backup", "ghost"]);
    cmd.assert().code(1).stderr(contains("no server named ghost"));
}

#[test]
fn restore_refuses_to_run_without_the_unsafe_flag() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));

    let mut register = cargo_bin_cmd!("varta");
    register.env("VARTA_RECORDS_PATH", records_path(&tmp));
    register.args(["register", "web-01", "--ip", "203.0.113.9"]);
    register.assert().success();

    let mut restore = cargo_bin_cmd!("varta");
    restore.env("VARTA_RECORDS_PATH", records_path(&tmp));
    restore.args(["restore", "web-01", "--backup", "2026-01-02T03-04-05"]);
    restore.assert().code(1).stderr(contains("--unsafe-mode"));
}

#[test]
fn fresh_store_lists_no_servers() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let mut cmd = cargo_bin_cmd!("varta");
    cmd.env("VARTA_RECORDS_PATH", records_path(&tmp));
    cmd.args(["servers"]);
    cmd.assert()
        .success()
        .stdout(contains("no servers registered"));
}

//! Integration tests for the `provision` binary.
//!
//! Covers the constants dump, flag and environment layering, argument errors,
//! and the `serve` lifecycle. The full `serve` round trip needs a real `rsync`
//! and is ignored by default.

use std::fs;
use std::net::{Ipv4Addr, TcpListener};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use rstest::{fixture, rstest};
use tempfile::TempDir;

const OVERRIDES: [&str; 5] = [
    "PROVISION_LOG_FILTER",
    "PROVISION_LOG_FORMAT",
    "PROVISION_RSYNC",
    "PROVISION_RSYNC_PORT",
    "PROVISION_SSH_PORT",
];

fn provision() -> assert_cmd::Command {
    let mut command = cargo_bin_cmd!("provision");
    for variable in OVERRIDES {
        command.env_remove(variable);
    }
    command
}

fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local address").port()
}

#[fixture]
fn root() -> TempDir {
    TempDir::new().expect("create root")
}

#[test]
fn constants_lists_defaults_sorted_by_name() {
    provision().arg("constants").assert().success().stdout(concat!(
        "LOG_FILTER = info\n",
        "LOG_FORMAT = compact\n",
        "RSYNC = rsync\n",
        "RSYNC_PORT = 2873\n",
        "SSH_PORT = 22\n",
    ));
}

#[test]
fn constants_reflect_environment_overrides() {
    provision()
        .arg("constants")
        .env("PROVISION_RSYNC_PORT", "8730")
        .env("PROVISION_SSH_PORT", "")
        .assert()
        .success()
        .stdout(contains("RSYNC_PORT = 8730\n").and(contains("SSH_PORT = 22\n")));
}

#[test]
fn flags_before_the_subcommand_override_the_environment() {
    provision()
        .args(["--rsync-port", "9000", "--log-format=json", "constants"])
        .env("PROVISION_RSYNC_PORT", "8730")
        .assert()
        .success()
        .stdout(contains("RSYNC_PORT = 9000\n").and(contains("LOG_FORMAT = json\n")));
}

#[test]
fn malformed_override_fails_naming_the_constant() {
    provision()
        .arg("constants")
        .env("PROVISION_SSH_PORT", "twenty-two")
        .assert()
        .failure()
        .stderr(contains("SSH_PORT").and(contains("twenty-two")));
}

#[test]
fn malformed_flag_fails_constant_resolution() {
    provision()
        .args(["--rsync-port", "not-a-port", "constants"])
        .assert()
        .failure()
        .stderr(contains("failed to resolve constants"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    provision()
        .arg("teleport")
        .assert()
        .failure()
        .stderr(contains("teleport"));
}

#[rstest]
fn invalid_module_name_is_rejected(root: TempDir) {
    provision()
        .arg("serve")
        .arg(root.path())
        .args(["--module", "../escape"])
        .assert()
        .failure()
        .stderr(contains("invalid daemon specification"));
}

#[rstest]
fn daemon_exiting_during_startup_fails_after_creating_layout(root: TempDir) {
    let served = root.path().join("served");
    provision()
        .args(["--rsync", "false", "--rsync-port"])
        .arg(free_port().to_string())
        .arg("serve")
        .arg(&served)
        .args(["--module", "log", "--create-dirs"])
        .assert()
        .failure()
        .stderr(contains("exited before accepting connections"));
    assert!(served.join("log").is_dir());
}

#[rstest]
fn missing_rsync_binary_is_reported(root: TempDir) {
    provision()
        .args(["--rsync", "/nonexistent/provision/rsync", "--rsync-port"])
        .arg(free_port().to_string())
        .arg("serve")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(contains("failed to launch rsync binary"));
}

#[rstest]
#[ignore = "requires the rsync binary on PATH"]
fn serve_stops_on_enter(root: TempDir) {
    fs::create_dir(root.path().join("log")).expect("create log module");
    let port = free_port();
    provision()
        .arg("--rsync-port")
        .arg(port.to_string())
        .arg("serve")
        .arg(root.path())
        .args(["--module", "log"])
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(contains(format!(
            "rsyncd running on port {port}. Press Enter to stop"
        )));
}

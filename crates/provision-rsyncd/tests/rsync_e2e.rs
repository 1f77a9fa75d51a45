//! End-to-end transfer through a real `rsync --daemon`.
//!
//! Ignored by default; run with `cargo test -- --ignored` where `rsync` is on
//! the `PATH`.

use std::fs::{self, Permissions};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::process::{Command, Stdio};
use std::time::Duration;

use provision_rsyncd::{CancellationHandle, CancellationSource, LifecycleState, RsyncDaemon};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Cancellation source that never fires, keeping the test off `SIGINT`.
struct Never;

impl CancellationSource for Never {
    fn handle(&self) -> Box<dyn CancellationHandle> {
        Box::new(NeverHandle)
    }

    fn wait(&mut self) -> bool {
        false
    }
}

struct NeverHandle;

impl CancellationHandle for NeverHandle {
    fn close(&self) {}
}

fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local address").port()
}

// rsyncd switches to `nobody` when started by root, so the tree must be
// reachable and the module writable for other users.
#[fixture]
fn root() -> TempDir {
    let dir = TempDir::new().expect("create daemon root");
    let log = dir.path().join("log");
    fs::create_dir(&log).expect("create log module");
    fs::set_permissions(dir.path(), Permissions::from_mode(0o755)).expect("chmod root");
    fs::set_permissions(&log, Permissions::from_mode(0o777)).expect("chmod log module");
    dir
}

#[rstest]
#[ignore = "requires the rsync binary on PATH"]
fn pushes_into_a_read_write_module_and_pulls_from_local(root: TempDir) {
    let port = free_port();
    let daemon = RsyncDaemon::builder(root.path())
        .port(port)
        .module("log")
        .cancellation_source(Never)
        .start()
        .expect("start rsync daemon");
    daemon
        .wait_until_ready(READY_TIMEOUT)
        .expect("daemon accepts connections");
    let config = daemon.config_path().expect("config present while running");

    let scratch = TempDir::new().expect("scratch directory");
    let source = scratch.path().join("file.txt");
    fs::write(&source, b"hello from the remote side\n").expect("write source file");
    let pushed = Command::new("rsync")
        .arg(&source)
        .arg(format!("rsync://127.0.0.1:{port}/log/file.txt"))
        .status()
        .expect("run rsync push");
    assert!(pushed.success(), "push failed with {pushed}");
    assert_eq!(
        fs::read(root.path().join("log/file.txt")).expect("read pushed file"),
        b"hello from the remote side\n"
    );

    fs::write(root.path().join("input.txt"), b"inputs\n").expect("write input");
    let pulled_path = scratch.path().join("input.txt");
    let pulled = Command::new("rsync")
        .arg(format!("rsync://127.0.0.1:{port}/local/input.txt"))
        .arg(&pulled_path)
        .status()
        .expect("run rsync pull");
    assert!(pulled.success(), "pull failed with {pulled}");
    assert_eq!(fs::read(&pulled_path).expect("read pulled file"), b"inputs\n");

    let rejected = Command::new("rsync")
        .arg(&source)
        .arg(format!("rsync://127.0.0.1:{port}/local/file.txt"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("run rsync push to read-only module");
    assert!(!rejected.success(), "local module must be read-only");

    daemon.dispose().expect("dispose");
    assert_eq!(daemon.lifecycle(), LifecycleState::Disposed);
    assert!(daemon.wait().is_ok());
    assert!(!config.exists(), "configuration must be removed");
    assert!(
        TcpStream::connect((Ipv4Addr::LOCALHOST, port)).is_err(),
        "port must be released"
    );
}

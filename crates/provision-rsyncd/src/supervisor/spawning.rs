//! Launches the rsync binary in daemon mode and kills it with its children.
//!
//! The daemon leads a fresh process group, so a terminal Ctrl-C aimed at the
//! foreground group does not reach it and teardown can kill the whole group.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::debug;

use super::PROCESS_TARGET;
use crate::error::SupervisorError;

/// Loopback address the daemon binds.
pub const LISTEN_ADDRESS: &str = "127.0.0.1";

/// Arguments that keep rsync in the foreground as a loopback-only daemon.
pub(super) fn daemon_arguments(port: u16, config: &Path) -> Vec<OsString> {
    vec![
        OsString::from("--daemon"),
        OsString::from("--address"),
        OsString::from(LISTEN_ADDRESS),
        OsString::from("--no-detach"),
        OsString::from("--port"),
        OsString::from(port.to_string()),
        OsString::from("--config"),
        config.as_os_str().to_owned(),
    ]
}

/// Spawns the daemon in its own process group with stdin closed and both
/// output streams piped.
pub(super) fn spawn_daemon(
    binary: &OsStr,
    port: u16,
    config: &Path,
) -> Result<Child, SupervisorError> {
    Command::new(binary)
        .args(daemon_arguments(port, config))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|source| SupervisorError::Launch {
            binary: binary.to_owned(),
            source,
        })
}

/// Sends `SIGKILL` to the daemon's process group, falling back to the daemon
/// alone when the group cannot be signalled.
pub(super) fn kill_group(child: &mut Child, pid: u32) -> io::Result<()> {
    let Ok(raw) = i32::try_from(pid) else {
        return child.kill();
    };
    killpg(Pid::from_raw(raw), Signal::SIGKILL).or_else(|errno| {
        debug!(
            target: PROCESS_TARGET,
            pid,
            error = %errno,
            "process group kill failed; killing the daemon alone"
        );
        child.kill()
    })
}

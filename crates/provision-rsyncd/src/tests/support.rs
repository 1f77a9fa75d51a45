//! Shared fixtures: stand-in daemon binaries, sandbox roots and free ports.

use std::fs;
use std::net::{Ipv4Addr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use rstest::fixture;
use tempfile::TempDir;

use crate::daemon_spec::DaemonSpec;
use crate::error::{DaemonFault, TeardownError};
use crate::lifecycle::{CancellationHandle, CancellationPolicy, CancellationSource};
use crate::reporter::DaemonReporter;

/// Behaviour of a stand-in daemon script. Every script ignores its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeDaemon {
    /// Stays alive until killed.
    Sleeper,
    /// Exits with status 3 straight away.
    FailsOnLaunch,
    /// Exits with status 0 straight away.
    ExitsCleanly,
    /// Runs for a second, then exits with status 4.
    DiesLater,
    /// Keeps a background child alive in its process group until killed.
    Forks,
}

impl FakeDaemon {
    fn file_name(self) -> &'static str {
        match self {
            Self::Sleeper => "sleeper",
            Self::FailsOnLaunch => "fails-on-launch",
            Self::ExitsCleanly => "exits-cleanly",
            Self::DiesLater => "dies-later",
            Self::Forks => "forks",
        }
    }

    fn body(self) -> &'static str {
        match self {
            Self::Sleeper => "exec sleep 30",
            Self::FailsOnLaunch => "exit 3",
            Self::ExitsCleanly => "exit 0",
            Self::DiesLater => "sleep 1\nexit 4",
            Self::Forks => "sleep 30 &\nwait",
        }
    }
}

struct FakeBinaries {
    dir: TempDir,
}

// Written once per test binary so no test executes a script another thread is
// still writing.
static FAKES: Lazy<FakeBinaries> = Lazy::new(|| {
    let dir = TempDir::new().expect("create fake daemon directory");
    for kind in [
        FakeDaemon::Sleeper,
        FakeDaemon::FailsOnLaunch,
        FakeDaemon::ExitsCleanly,
        FakeDaemon::DiesLater,
        FakeDaemon::Forks,
    ] {
        write_script(dir.path(), kind);
    }
    FakeBinaries { dir }
});

fn write_script(dir: &Path, kind: FakeDaemon) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(kind.file_name());
    fs::write(&path, format!("#!/bin/sh\n{}\n", kind.body())).expect("write fake daemon");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake daemon");
}

/// Path of a stand-in daemon binary.
pub(crate) fn fake_daemon(kind: FakeDaemon) -> PathBuf {
    FAKES.dir.path().join(kind.file_name())
}

/// A port nothing listens on at the time of the call.
pub(crate) fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local address").port()
}

/// Sandbox root with one `log` module directory.
#[fixture]
pub(crate) fn sandbox() -> TempDir {
    let dir = TempDir::new().expect("create sandbox root");
    fs::create_dir(dir.path().join("log")).expect("create log module");
    dir
}

/// Spec rooted at `root` with a single `log` module on a free port.
pub(crate) fn log_spec(root: &Path) -> DaemonSpec {
    DaemonSpec::new(root, free_port(), ["log"]).expect("valid spec")
}

/// Whether a process with `pid` still exists (zombies included).
pub(crate) fn process_exists(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).expect("pid fits in i32");
    kill(Pid::from_raw(raw), None).is_ok()
}

/// Processes in group `pgid` that have not exited, read from `/proc`.
#[cfg(target_os = "linux")]
pub(crate) fn live_group_members(pgid: u32) -> Vec<u32> {
    let entries = fs::read_dir("/proc").expect("read /proc");
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| {
            let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
                return false;
            };
            // Fields after the parenthesised command name: state, ppid, pgrp.
            let Some((_, tail)) = stat.rsplit_once(')') else {
                return false;
            };
            let mut fields = tail.split_whitespace();
            let state = fields.next();
            let group = fields.nth(1).and_then(|field| field.parse::<u32>().ok());
            state != Some("Z") && group == Some(pgid)
        })
        .collect()
}

/// Reporter that counts every callback.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    started: AtomicUsize,
    ready: AtomicUsize,
    failed: Mutex<Vec<String>>,
    cancellations: AtomicUsize,
    teardown_failures: Mutex<Vec<String>>,
    disposed: AtomicUsize,
}

impl RecordingReporter {
    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn ready(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn failures(&self) -> Vec<String> {
        self.failed.lock().expect("reporter mutex poisoned").clone()
    }

    pub(crate) fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    pub(crate) fn teardown_failures(&self) -> Vec<String> {
        self.teardown_failures
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    pub(crate) fn disposals(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl DaemonReporter for RecordingReporter {
    fn daemon_started(&self, _spec: &DaemonSpec, _pid: u32) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn daemon_ready(&self, _port: u16) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }

    fn daemon_failed(&self, fault: &DaemonFault) {
        self.failed
            .lock()
            .expect("reporter mutex poisoned")
            .push(fault.to_string());
    }

    fn cancellation_received(&self, _policy: CancellationPolicy) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }

    fn teardown_failed(&self, error: &TeardownError) {
        self.teardown_failures
            .lock()
            .expect("reporter mutex poisoned")
            .push(error.to_string());
    }

    fn daemon_disposed(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ManualState {
    pending: usize,
    closed: bool,
}

/// Cancellation source triggered by the test instead of by SIGINT.
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualCancellation {
    inner: Arc<(Mutex<ManualState>, Condvar)>,
}

impl ManualCancellation {
    /// Delivers one cancellation request.
    pub(crate) fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().expect("cancellation mutex poisoned").pending += 1;
        cvar.notify_all();
    }

    /// Whether the controller closed the listener.
    pub(crate) fn is_closed(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().expect("cancellation mutex poisoned").closed
    }
}

impl CancellationSource for ManualCancellation {
    fn handle(&self) -> Box<dyn CancellationHandle> {
        Box::new(self.clone())
    }

    fn wait(&mut self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().expect("cancellation mutex poisoned");
        loop {
            if state.closed {
                return false;
            }
            if state.pending > 0 {
                state.pending -= 1;
                return true;
            }
            state = cvar.wait(state).expect("cancellation mutex poisoned");
        }
    }
}

impl CancellationHandle for ManualCancellation {
    fn close(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().expect("cancellation mutex poisoned").closed = true;
        cvar.notify_all();
    }
}

/// Probe period short enough to keep behavioural tests quick.
pub(crate) const FAST_PROBE: Duration = Duration::from_millis(50);

//! Ownership of the rsync subprocess and its configuration file.
//!
//! - [`state`] models run states and probe observations.
//! - [`spawning`] builds the daemon command line, launches it in its own
//!   process group and kills that group.
//! - [`forwarding`] drains the daemon's output into the log.
//! - [`readiness`] checks the port before launch and probes whether the
//!   daemon accepts connections.

mod forwarding;
mod readiness;
mod spawning;
mod state;

use std::ffi::OsStr;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{ConfigFile, render_config};
use crate::daemon_spec::DaemonSpec;
use crate::error::{SupervisorError, TeardownError};

pub use spawning::LISTEN_ADDRESS;
pub use state::{ExitSummary, Observation, RunState};

use readiness::{ensure_port_free, port_accepts};
use state::ProcessSlot;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns one rsync daemon process and the configuration file it reads.
///
/// The handle and the configuration path are only mutated by [`stop`] and
/// [`remove_config`]; every other method reads.
///
/// [`stop`]: ProcessSupervisor::stop
/// [`remove_config`]: ProcessSupervisor::remove_config
#[derive(Debug)]
pub struct ProcessSupervisor {
    spec: DaemonSpec,
    pid: u32,
    ready: AtomicBool,
    slot: Mutex<ProcessSlot>,
    config: Mutex<Option<ConfigFile>>,
}

impl ProcessSupervisor {
    /// Writes the configuration for `spec` and launches `binary` against it.
    ///
    /// An immediate failure of the daemon is not detected here; the health
    /// monitor or [`wait_until_listening`](Self::wait_until_listening)
    /// observe it.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::PortInUse`] when another listener already
    /// owns the port, [`SupervisorError::ConfigWrite`] when the configuration
    /// cannot be written and [`SupervisorError::Launch`] when the binary cannot
    /// be executed. The configuration file is removed in the latter case.
    pub fn start(spec: DaemonSpec, binary: &OsStr) -> Result<Self, SupervisorError> {
        ensure_port_free(spec.port()).map_err(|source| SupervisorError::PortInUse {
            port: spec.port(),
            source,
        })?;
        let config = ConfigFile::write(&render_config(&spec))
            .map_err(|source| SupervisorError::ConfigWrite { source })?;
        debug!(
            target: PROCESS_TARGET,
            file = %config.path().display(),
            "wrote rsyncd configuration"
        );
        let mut child = spawning::spawn_daemon(binary, spec.port(), config.path())?;
        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            forwarding::forward_lines(stdout, pid, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forwarding::forward_lines(stderr, pid, "stderr");
        }
        info!(
            target: PROCESS_TARGET,
            pid,
            port = spec.port(),
            root = %spec.root().display(),
            modules = spec.modules().len(),
            "rsync daemon spawned"
        );
        Ok(Self {
            spec,
            pid,
            ready: AtomicBool::new(false),
            slot: Mutex::new(ProcessSlot::Live(child)),
            config: Mutex::new(Some(config)),
        })
    }

    /// Specification the daemon was started with.
    #[must_use]
    pub const fn spec(&self) -> &DaemonSpec {
        &self.spec
    }

    /// OS process identifier of the daemon.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Path of the configuration file while it exists.
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        lock(&self.config)
            .as_ref()
            .map(|config| config.path().to_path_buf())
    }

    /// Reads the process state without blocking.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the process state cannot be queried.
    pub fn observe(&self) -> io::Result<Observation> {
        let mut slot = lock(&self.slot);
        match &mut *slot {
            ProcessSlot::Live(child) => Ok(match child.try_wait()? {
                Some(status) => Observation::Exited(status.into()),
                None => Observation::Running,
            }),
            ProcessSlot::Stopped(_) => Ok(Observation::Cleared),
        }
    }

    /// Current run state. A failed OS query is reported as still running.
    #[must_use]
    pub fn state(&self) -> RunState {
        if let ProcessSlot::Stopped(state) = &*lock(&self.slot) {
            return *state;
        }
        match self.observe() {
            Ok(Observation::Exited(summary)) => RunState::Exited(summary),
            _ if self.ready.load(Ordering::Acquire) => RunState::Running,
            _ => RunState::Starting,
        }
    }

    /// Polls until the daemon accepts connections on its port.
    ///
    /// The process is observed again after a successful connect, so a daemon
    /// that died while something else answered is not reported ready.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ExitedDuringStartup`] when the process ends
    /// first, [`SupervisorError::StartupTimeout`] when `timeout` expires, and
    /// [`SupervisorError::Stopped`] when teardown already released the process.
    pub fn wait_until_listening(&self, timeout: Duration) -> Result<(), SupervisorError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_running()?;
            if port_accepts(self.spec.port()) {
                self.ensure_running()?;
                self.ready.store(true, Ordering::Release);
                info!(
                    target: PROCESS_TARGET,
                    pid = self.pid,
                    port = self.spec.port(),
                    "rsync daemon accepting connections"
                );
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::StartupTimeout {
                    port: self.spec.port(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }

    fn ensure_running(&self) -> Result<(), SupervisorError> {
        match self
            .observe()
            .map_err(|source| SupervisorError::Probe { source })?
        {
            Observation::Running => Ok(()),
            Observation::Exited(status) => Err(SupervisorError::ExitedDuringStartup { status }),
            Observation::Cleared => Err(SupervisorError::Stopped),
        }
    }

    /// Forcibly terminates the daemon's process group and releases its handle.
    ///
    /// Idempotent. A process that already exited is reaped rather than killed.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError::Kill`] when a live process could not be
    /// signalled (the handle is kept) and [`TeardownError::Reap`] when the
    /// killed process could not be waited on.
    pub fn stop(&self) -> Result<(), TeardownError> {
        let mut slot = lock(&self.slot);
        let ProcessSlot::Live(child) = &mut *slot else {
            return Ok(());
        };
        let pid = self.pid;
        match child.try_wait() {
            Ok(Some(status)) => {
                let summary = ExitSummary::from(status);
                debug!(
                    target: PROCESS_TARGET,
                    pid,
                    status = %summary,
                    "rsync daemon already exited; reaped"
                );
                *slot = ProcessSlot::Stopped(RunState::Exited(summary));
                return Ok(());
            }
            Ok(None) => {}
            Err(error) => {
                debug!(
                    target: PROCESS_TARGET,
                    pid,
                    error = %error,
                    "failed to query rsync daemon before kill"
                );
            }
        }
        debug!(target: PROCESS_TARGET, pid, "stopping rsync daemon");
        spawning::kill_group(child, pid).map_err(|source| TeardownError::Kill { pid, source })?;
        let reaped = child.wait();
        *slot = ProcessSlot::Stopped(RunState::Killed);
        reaped.map_err(|source| TeardownError::Reap { pid, source })?;
        info!(target: PROCESS_TARGET, pid, "rsync daemon stopped");
        Ok(())
    }

    /// Deletes the configuration file exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError::RemoveConfig`] when an existing file cannot be
    /// deleted. A missing file is not an error.
    pub fn remove_config(&self) -> Result<(), TeardownError> {
        let Some(config) = lock(&self.config).take() else {
            return Ok(());
        };
        let path = config.path().to_path_buf();
        config
            .remove()
            .map_err(|source| TeardownError::RemoveConfig {
                path: path.clone(),
                source,
            })?;
        debug!(
            target: PROCESS_TARGET,
            file = %path.display(),
            "removed rsyncd configuration"
        );
        Ok(())
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(
                target: PROCESS_TARGET,
                pid = self.pid,
                error = %error,
                "failed to stop rsync daemon on drop"
            );
        }
        if let Err(error) = self.remove_config() {
            warn!(
                target: PROCESS_TARGET,
                error = %error,
                "failed to remove rsyncd configuration on drop"
            );
        }
    }
}

// The guarded data is replaced wholesale, never left half-updated, so a
// poisoned lock still holds a consistent value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Error surface of the daemon supervisor.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::daemon_spec::SpecError;
use crate::supervisor::ExitSummary;

/// Errors returned synchronously while starting or waiting on the daemon.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The requested daemon layout was invalid.
    #[error("invalid daemon specification: {source}")]
    Spec {
        /// Validation failure.
        #[from]
        source: SpecError,
    },
    /// Another process already listens on the daemon port.
    #[error("port {port} on 127.0.0.1 is already in use: {source}")]
    PortInUse {
        /// Port the daemon was asked to bind.
        port: u16,
        /// Bind failure from the pre-launch check.
        #[source]
        source: io::Error,
    },
    /// The generated configuration could not be written to disk.
    #[error("failed to write rsyncd configuration: {source}")]
    ConfigWrite {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The rsync binary could not be found or executed.
    #[error("failed to launch rsync binary {binary:?}: {source}")]
    Launch {
        /// Binary that was executed.
        binary: OsString,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// The interactive cancellation listener could not be installed.
    #[error("failed to install cancellation listener: {source}")]
    Cancellation {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A supervisor thread could not be spawned.
    #[error("failed to start {name} thread: {source}")]
    Thread {
        /// Role of the thread.
        name: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The daemon ended before it accepted a connection.
    #[error("rsync daemon exited before accepting connections ({status})")]
    ExitedDuringStartup {
        /// How the process ended.
        status: ExitSummary,
    },
    /// The daemon did not accept connections within the readiness budget.
    #[error("rsync daemon did not accept connections on port {port} within {timeout_ms} ms")]
    StartupTimeout {
        /// Port that was probed.
        port: u16,
        /// Budget that expired.
        timeout_ms: u64,
    },
    /// The process handle was released before the operation ran.
    #[error("rsync daemon has already been stopped")]
    Stopped,
    /// Querying the OS for the process state failed.
    #[error("failed to query rsync daemon state: {source}")]
    Probe {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Fatal condition detected asynchronously by the health monitor.
///
/// Faults are never retried. Exactly one is recorded per daemon.
#[derive(Debug, Clone, Error)]
pub enum DaemonFault {
    /// The daemon failed on launch: it was already gone with a non-zero status
    /// on the first probe.
    #[error("rsync daemon failed to launch ({status})")]
    ExitedEarly {
        /// How the process ended.
        status: ExitSummary,
    },
    /// The daemon ended while nobody was tearing it down.
    #[error("rsync terminated unexpectedly ({status})")]
    UnexpectedTermination {
        /// How the process ended.
        status: ExitSummary,
    },
    /// The OS refused to report the process state.
    #[error("failed to query rsync daemon state: {source}")]
    ProbeFailed {
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Best-effort teardown failures surfaced from `dispose`.
///
/// A process that had already exited and a configuration file that was already
/// gone are not failures.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// Killing a live process failed.
    #[error("failed to kill rsync daemon pid {pid}: {source}")]
    Kill {
        /// Process that survived.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Reaping the killed process failed.
    #[error("failed to reap rsync daemon pid {pid}: {source}")]
    Reap {
        /// Process that could not be reaped.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Deleting the configuration file failed.
    #[error("failed to remove rsyncd configuration '{path}': {source}")]
    RemoveConfig {
        /// File that could not be deleted.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

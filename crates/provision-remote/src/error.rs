//! Errors raised by remote sessions.

use std::ffi::OsString;
use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors returned by [`RemoteSession`](crate::RemoteSession) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation needs a connected session.
    #[error("remote session is not connected")]
    NotConnected,
    /// The private directory holding the control socket could not be managed.
    #[error("failed to manage ssh control directory: {source}")]
    ControlDirectory {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A client program could not be executed.
    #[error("failed to run {program:?}: {source}")]
    Spawn {
        /// Program that was executed.
        program: OsString,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Reading the output of a remote command failed.
    #[error("failed to read output of remote command: {source}")]
    Output {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A client program ran but reported failure.
    #[error("{operation} failed with {status}")]
    CommandFailed {
        /// Operation that failed, such as `push` or `execute`.
        operation: &'static str,
        /// Exit status of the client program.
        status: ExitStatus,
    },
    /// The control master exited before the connection was established.
    #[error("ssh control master for {host} exited with {status}")]
    MasterExited {
        /// Remote host.
        host: String,
        /// Exit status of the control master.
        status: ExitStatus,
    },
    /// The control socket never answered within the connect budget.
    #[error("ssh connection to {host} was not established within {timeout_ms} ms")]
    ConnectTimeout {
        /// Remote host.
        host: String,
        /// Budget that expired.
        timeout_ms: u64,
    },
}

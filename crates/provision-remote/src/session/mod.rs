//! Fluent remote session over the system `ssh` and `scp` clients.
//!
//! - [`command`] renders the client command lines.
//! - [`connection`] owns the control master and its socket directory.
//! - [`streaming`] relays remote output line by line.

mod command;
mod connection;
mod streaming;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use provision_config::Constants;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::severity::Severity;

pub use command::Forward;

use command::{Auth, Invocation, Settings};
use connection::{Connection, spawn_error};

pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// An SSH session to one remote host.
///
/// Configure it with the builder methods, [`connect`](Self::connect), then
/// chain [`push`](Self::push), [`execute`](Self::execute) and
/// [`pull`](Self::pull). Dropping a connected session disconnects it.
#[derive(Debug)]
pub struct RemoteSession {
    settings: Settings,
    connection: Option<Connection>,
}

impl RemoteSession {
    /// Starts configuring a session to `host` on the default SSH port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            settings: Settings::new(host.into()),
            connection: None,
        }
    }

    /// Takes the SSH port from resolved constants.
    #[must_use]
    pub fn constants(mut self, constants: &Constants) -> Self {
        self.settings.port = constants.ssh_port();
        self
    }

    /// Remote user name. Defaults to whatever `ssh` picks.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.settings.user = Some(user.into());
        self
    }

    /// SSH port of the remote host.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    /// Lets the remote host reach `local_port` here through `remote_port`.
    #[must_use]
    pub fn forward_remote(mut self, remote_port: u16, local_port: u16) -> Self {
        self.settings.forwards.push(Forward::Remote {
            remote_port,
            local_port,
        });
        self
    }

    /// Lets this host reach `remote_port` on the peer through `local_port`.
    #[must_use]
    pub fn forward_local(mut self, local_port: u16, remote_port: u16) -> Self {
        self.settings.forwards.push(Forward::Local {
            local_port,
            remote_port,
        });
        self
    }

    /// Authenticates with a private key file.
    #[must_use]
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.auth = Auth::KeyFile(path.into());
        self
    }

    /// Authenticates with a password, passed to `sshpass` through `SSHPASS`.
    #[must_use]
    pub fn password(mut self, secret: impl Into<String>) -> Self {
        self.settings.auth = Auth::Password(secret.into());
        self
    }

    /// `ssh` client to run.
    #[must_use]
    pub fn ssh_program(mut self, program: impl Into<OsString>) -> Self {
        self.settings.ssh = program.into();
        self
    }

    /// `scp` client to run.
    #[must_use]
    pub fn scp_program(mut self, program: impl Into<OsString>) -> Self {
        self.settings.scp = program.into();
        self
    }

    /// How long [`connect`](Self::connect) waits for the control socket.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Configured forwards, in the order they were added.
    #[must_use]
    pub fn forwards(&self) -> &[Forward] {
        &self.settings.forwards
    }

    /// Whether a control master is running for this session.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Starts the control master and waits until it accepts commands.
    /// Connecting a connected session does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MasterExited`] when authentication or a forward
    /// fails, [`SessionError::ConnectTimeout`] when the socket never answers,
    /// and [`SessionError::Spawn`] when the client cannot be executed.
    pub fn connect(mut self) -> Result<Self, SessionError> {
        if self.connection.is_none() {
            self.connection = Some(Connection::open(&self.settings)?);
        }
        Ok(self)
    }

    /// Copies `local` (a file or a whole directory) to `remote` on the peer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] before [`connect`](Self::connect)
    /// and [`SessionError::CommandFailed`] when `scp` fails.
    pub fn push(&self, local: impl AsRef<Path>, remote: &str) -> Result<&Self, SessionError> {
        let socket = self.socket()?;
        let invocation = command::push(&self.settings, socket, local.as_ref(), remote);
        run(&invocation, "push")?;
        Ok(self)
    }

    /// Copies `remote` (a file or a whole directory) on the peer to `local`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] before [`connect`](Self::connect)
    /// and [`SessionError::CommandFailed`] when `scp` fails.
    pub fn pull(&self, remote: &str, local: impl AsRef<Path>) -> Result<&Self, SessionError> {
        let socket = self.socket()?;
        let invocation = command::pull(&self.settings, socket, remote, local.as_ref());
        run(&invocation, "pull")?;
        Ok(self)
    }

    /// Runs `script` on the peer, calling `callback` for every output line.
    ///
    /// Lines from both streams are classified with [`Severity::classify`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] before [`connect`](Self::connect),
    /// [`SessionError::Output`] when reading the output fails, and
    /// [`SessionError::CommandFailed`] when the script exits non-zero.
    pub fn execute<F>(&self, script: &str, callback: F) -> Result<&Self, SessionError>
    where
        F: FnMut(Severity, &str),
    {
        let socket = self.socket()?;
        let invocation = command::execute(&self.settings, socket, script);
        debug!(target: SESSION_TARGET, host = %self.settings.host, script, "executing remote script");
        let mut child = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| spawn_error(&invocation, source))?;
        let relayed = streaming::relay_lines(&mut child, callback);
        let status = child
            .wait()
            .map_err(|source| SessionError::Output { source })?;
        relayed.map_err(|source| SessionError::Output { source })?;
        if !status.success() {
            return Err(SessionError::CommandFailed {
                operation: "execute",
                status,
            });
        }
        Ok(self)
    }

    /// Ends the connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ControlDirectory`] when the socket directory
    /// cannot be removed; the master has been stopped regardless.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.connection
            .take()
            .map_or(Ok(()), |connection| connection.close(&self.settings))
    }

    fn socket(&self) -> Result<&Path, SessionError> {
        self.connection
            .as_ref()
            .map(Connection::socket)
            .ok_or(SessionError::NotConnected)
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if let Err(error) = self.disconnect() {
            warn!(
                target: SESSION_TARGET,
                host = %self.settings.host,
                error = %error,
                "failed to disconnect ssh session on drop"
            );
        }
    }
}

fn run(invocation: &Invocation, operation: &'static str) -> Result<(), SessionError> {
    let status = invocation
        .command()
        .stdin(Stdio::null())
        .status()
        .map_err(|source| spawn_error(invocation, source))?;
    if status.success() {
        Ok(())
    } else {
        Err(SessionError::CommandFailed { operation, status })
    }
}

//! The control master process and its private socket directory.

use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::SESSION_TARGET;
use super::command::{self, ControlOp, Invocation, Settings};
use super::streaming;
use crate::error::SessionError;

const CHECK_INTERVAL: Duration = Duration::from_millis(100);
const SOCKET_NAME: &str = "control";

/// A live control master.
#[derive(Debug)]
pub(super) struct Connection {
    directory: TempDir,
    socket: PathBuf,
    master: Child,
}

impl Connection {
    /// Starts the master and waits until its control socket answers.
    pub(super) fn open(settings: &Settings) -> Result<Self, SessionError> {
        let directory = tempfile::Builder::new()
            .prefix("provision-ssh-")
            .tempdir()
            .map_err(|source| SessionError::ControlDirectory { source })?;
        let socket = directory.path().join(SOCKET_NAME);
        let invocation = command::master(settings, &socket);
        let mut master = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| spawn_error(&invocation, source))?;
        if let Some(stderr) = master.stderr.take() {
            streaming::log_lines(stderr, "ssh-master");
        }
        debug!(
            target: SESSION_TARGET,
            host = %settings.host,
            pid = master.id(),
            "ssh control master spawned"
        );
        let mut connection = Self {
            directory,
            socket,
            master,
        };
        if let Err(error) = connection.await_control(settings) {
            connection.terminate();
            return Err(error);
        }
        info!(
            target: SESSION_TARGET,
            host = %settings.host,
            port = settings.port,
            forwards = settings.forwards.len(),
            "ssh session connected"
        );
        Ok(connection)
    }

    pub(super) fn socket(&self) -> &Path {
        &self.socket
    }

    fn await_control(&mut self, settings: &Settings) -> Result<(), SessionError> {
        let deadline = Instant::now() + settings.connect_timeout;
        let check = command::control(settings, &self.socket, ControlOp::Check);
        loop {
            match self.master.try_wait() {
                Ok(Some(status)) => {
                    return Err(SessionError::MasterExited {
                        host: settings.host.clone(),
                        status,
                    });
                }
                Ok(None) => {}
                Err(source) => return Err(spawn_error(&check, source)),
            }
            if quiet_status(&check)?.success() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::ConnectTimeout {
                    host: settings.host.clone(),
                    timeout_ms: u64::try_from(settings.connect_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                });
            }
            thread::sleep(CHECK_INTERVAL);
        }
    }

    /// Asks the master to exit, then kills and reaps it and removes the socket
    /// directory.
    pub(super) fn close(mut self, settings: &Settings) -> Result<(), SessionError> {
        let exit = command::control(settings, &self.socket, ControlOp::Exit);
        match quiet_status(&exit) {
            Ok(status) if status.success() => {}
            Ok(status) => debug!(
                target: SESSION_TARGET,
                host = %settings.host,
                %status,
                "control master did not acknowledge exit"
            ),
            Err(error) => debug!(
                target: SESSION_TARGET,
                host = %settings.host,
                error = %error,
                "failed to ask control master to exit"
            ),
        }
        self.terminate();
        self.directory
            .close()
            .map_err(|source| SessionError::ControlDirectory { source })?;
        info!(target: SESSION_TARGET, host = %settings.host, "ssh session disconnected");
        Ok(())
    }

    fn terminate(&mut self) {
        let pid = self.master.id();
        if matches!(self.master.try_wait(), Ok(Some(_))) {
            return;
        }
        if let Err(error) = self.master.kill() {
            warn!(
                target: SESSION_TARGET,
                pid,
                error = %error,
                "failed to kill ssh control master"
            );
            return;
        }
        if let Err(error) = self.master.wait() {
            warn!(
                target: SESSION_TARGET,
                pid,
                error = %error,
                "failed to reap ssh control master"
            );
        }
    }
}

fn quiet_status(invocation: &Invocation) -> Result<std::process::ExitStatus, SessionError> {
    invocation
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| spawn_error(invocation, source))
}

pub(super) fn spawn_error(invocation: &Invocation, source: std::io::Error) -> SessionError {
    SessionError::Spawn {
        program: invocation.program.clone(),
        source,
    }
}

//! Errors surfaced by the `provision` binary.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use provision_config::OrthoError;
use provision_remote::SessionError;
use provision_rsyncd::{DaemonFault, SupervisorError, TeardownError, TelemetryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Usage(clap::Error),
    #[error("failed to resolve constants: {0}")]
    Constants(Arc<OrthoError>),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("teardown failed: {0}")]
    Teardown(#[from] TeardownError),
    #[error("{0}")]
    Fault(#[from] DaemonFault),
    #[error("remote session failed: {0}")]
    Session(#[from] SessionError),
    #[error("failed to start stdin watcher: {0}")]
    StdinWatcher(#[source] io::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

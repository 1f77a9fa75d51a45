//! Starting the supervised daemon from command-line arguments.

use std::fs;
use std::path::Path;
use std::time::Duration;

use provision_config::Constants;
use provision_rsyncd::{CancellationPolicy, RsyncDaemon};
use tracing::info;

use crate::cli::DaemonArgs;
use crate::errors::CliError;

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Starts a daemon that tears itself down on Ctrl-C and waits until it
/// accepts connections.
pub(crate) fn start(
    root: &Path,
    args: &DaemonArgs,
    constants: &Constants,
) -> Result<RsyncDaemon, CliError> {
    if args.create_dirs {
        create_layout(root, &args.modules)?;
    }
    let daemon = RsyncDaemon::builder(root)
        .constants(constants)
        .modules(args.modules.iter().cloned())
        .cancellation_policy(CancellationPolicy::Dispose)
        .start()?;
    daemon.wait_until_ready(Duration::from_secs(args.ready_timeout))?;
    info!(
        target: DAEMON_TARGET,
        port = daemon.spec().port(),
        root = %root.display(),
        "serving directory"
    );
    Ok(daemon)
}

fn create_layout(root: &Path, modules: &[String]) -> Result<(), CliError> {
    let directories = std::iter::once(root.to_path_buf())
        .chain(modules.iter().map(|module| root.join(module)));
    for path in directories {
        fs::create_dir_all(&path).map_err(|source| CliError::CreateDirectory { path, source })?;
    }
    Ok(())
}

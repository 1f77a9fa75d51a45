//! The `exec` subcommand.

use std::io::{self, Write};

use provision_config::Constants;
use provision_remote::{RemoteSession, Severity};
use provision_rsyncd::RsyncDaemon;
use tracing::{debug, error, info, warn};

use crate::cli::ExecArgs;
use crate::daemon;
use crate::errors::CliError;

const REMOTE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::remote");

/// Pushes inputs, runs the script and pulls results on one SSH connection.
///
/// With `--serve`, a local daemon is started first and its port is forwarded
/// to the same port number on the remote host for the duration of the run.
pub(crate) fn exec<W: Write>(
    args: &ExecArgs,
    constants: &Constants,
    stdout: &mut W,
) -> Result<(), CliError> {
    let served = args
        .serve
        .as_ref()
        .map(|root| daemon::start(root, &args.daemon, constants))
        .transpose()?;
    let result = run_session(args, constants, served.as_ref(), stdout);
    let Some(daemon) = served else {
        return result;
    };
    let teardown = daemon.dispose();
    result?;
    teardown?;
    daemon.fault().map_or(Ok(()), |fault| Err(fault.into()))
}

fn run_session<W: Write>(
    args: &ExecArgs,
    constants: &Constants,
    served: Option<&RsyncDaemon>,
    stdout: &mut W,
) -> Result<(), CliError> {
    let mut builder = RemoteSession::new(args.host.as_str()).constants(constants);
    if let Some(user) = &args.user {
        builder = builder.user(user.as_str());
    }
    if let Some(key) = &args.key {
        builder = builder.key_file(key.as_path());
    }
    if let Some(daemon) = served {
        let port = daemon.spec().port();
        builder = builder.forward_remote(port, port);
    }
    let mut session = builder.connect()?;

    for transfer in &args.push {
        session.push(&transfer.source, &transfer.destination)?;
    }
    let mut write_failure: Option<io::Error> = None;
    session.execute(&args.script, |severity, line| {
        relay(severity, line, stdout, &mut write_failure);
    })?;
    if let Some(failure) = write_failure {
        return Err(CliError::Output(failure));
    }
    for transfer in &args.pull {
        session.pull(&transfer.source, &transfer.destination)?;
    }
    session.disconnect()?;
    Ok(())
}

fn relay<W: Write>(
    severity: Severity,
    line: &str,
    stdout: &mut W,
    write_failure: &mut Option<io::Error>,
) {
    match severity {
        Severity::Debug => debug!(target: REMOTE_TARGET, "{line}"),
        Severity::Info => info!(target: REMOTE_TARGET, "{line}"),
        Severity::Warn => warn!(target: REMOTE_TARGET, "{line}"),
        Severity::Error => error!(target: REMOTE_TARGET, "{line}"),
        Severity::Output => {
            if write_failure.is_none()
                && let Err(failure) = writeln!(stdout, "{line}")
            {
                *write_failure = Some(failure);
            }
        }
    }
}

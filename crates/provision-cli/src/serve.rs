//! The `serve` subcommand.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::{Arc, Weak};
use std::thread;

use provision_config::Constants;
use provision_rsyncd::RsyncDaemon;
use tracing::{debug, warn};

use crate::cli::ServeArgs;
use crate::daemon;
use crate::errors::CliError;

const SERVE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::serve");

/// Serves `args.root` until Enter, Ctrl-C or a daemon fault.
///
/// A fault is returned as an error after teardown, so it maps to a failing
/// exit code.
pub(crate) fn serve<W, R>(
    args: &ServeArgs,
    constants: &Constants,
    stdout: &mut W,
    stdin: R,
) -> Result<(), CliError>
where
    W: Write,
    R: Read + Send + 'static,
{
    let daemon = Arc::new(daemon::start(&args.root, &args.daemon, constants)?);
    writeln!(
        stdout,
        "rsyncd running on port {}. Press Enter to stop",
        daemon.spec().port()
    )
    .and_then(|()| stdout.flush())
    .map_err(CliError::Output)?;
    watch_stdin(stdin, Arc::downgrade(&daemon))?;

    let outcome = daemon.wait();
    daemon.dispose()?;
    outcome?;
    Ok(())
}

/// Disposes the daemon once a line arrives on `stdin`. End-of-file leaves it
/// running. The thread is detached.
fn watch_stdin<R>(stdin: R, served: Weak<RsyncDaemon>) -> Result<(), CliError>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("provision-stdin".to_owned())
        .spawn(move || {
            let mut line = String::new();
            match BufReader::new(stdin).read_line(&mut line) {
                Ok(0) => {
                    debug!(target: SERVE_TARGET, "stdin closed; waiting for Ctrl-C");
                    return;
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(target: SERVE_TARGET, error = %error, "failed to read stdin");
                    return;
                }
            }
            let Some(daemon) = served.upgrade() else {
                return;
            };
            if let Err(error) = daemon.dispose() {
                warn!(target: SERVE_TARGET, error = %error, "teardown after Enter failed");
            }
        })
        .map(drop)
        .map_err(CliError::StdinWatcher)
}

//! Runtime of the `provision` binary.
//!
//! [`run`] splits the constants flags from the subcommand line, resolves
//! [`Constants`] from those flags and the environment, installs telemetry and
//! dispatches to `constants`, `serve` or `exec`. IO streams are injected so the
//! runtime can be driven from tests.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::process::ExitCode;

use clap::Parser;
use provision_config::Constants;
use provision_rsyncd::telemetry;

mod cli;
mod config;
mod daemon;
mod errors;
mod exec;
mod serve;

use cli::{Cli, CliCommand};
use config::{ArgumentSplit, split_arguments};
use errors::CliError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// Runs the binary with the given arguments and IO handles.
///
/// `stdin` is only read by `serve`, on a background thread, to detect Enter.
#[must_use]
pub fn run<I, W, E, R>(args: I, stdout: &mut W, stderr: &mut E, stdin: R) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    R: Read + Send + 'static,
{
    let ArgumentSplit { config, command } = split_arguments(args);
    let cli = match Cli::try_parse_from(command) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            // --help and --version land here.
            return match write!(stdout, "{error}") {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }
        Err(error) => return report(stderr, &CliError::Usage(error)),
    };
    match dispatch(cli, config, stdout, stdin) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(stderr, &error),
    }
}

fn dispatch<W, R>(
    cli: Cli,
    config: Vec<OsString>,
    stdout: &mut W,
    stdin: R,
) -> Result<(), CliError>
where
    W: Write,
    R: Read + Send + 'static,
{
    let constants = Constants::from_args(config).map_err(CliError::Constants)?;
    match cli.command {
        CliCommand::Constants => write!(stdout, "{constants}").map_err(CliError::Output),
        CliCommand::Serve(args) => {
            start_telemetry(&constants)?;
            serve::serve(&args, &constants, stdout, stdin)
        }
        CliCommand::Exec(args) => {
            start_telemetry(&constants)?;
            exec::exec(&args, &constants, stdout)
        }
    }
}

fn start_telemetry(constants: &Constants) -> Result<(), CliError> {
    telemetry::initialise(&constants.log_settings())?;
    tracing::debug!(target: CLI_TARGET, "telemetry initialised");
    Ok(())
}

fn report<E: Write>(stderr: &mut E, error: &CliError) -> ExitCode {
    if writeln!(stderr, "provision: {error}").is_err() {
        tracing::error!(target: CLI_TARGET, error = %error, "failed to report error");
    }
    ExitCode::FAILURE
}

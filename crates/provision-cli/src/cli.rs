//! Command-line surface of the `provision` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Provisioning helper around a supervised local rsync daemon.
#[derive(Parser, Debug)]
#[command(
    name = "provision",
    version,
    disable_help_subcommand = true,
    after_help = "Constants flags go before the subcommand: --rsync-port, --rsync, \
                  --ssh-port, --log-filter, --log-format and --config-path. They \
                  override the matching PROVISION_* environment variables."
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Prints the resolved constants as `NAME = value` lines.
    Constants,
    /// Serves a directory through rsync until Enter, Ctrl-C or a daemon fault.
    Serve(ServeArgs),
    /// Runs a script on a remote host, optionally exposing a served directory
    /// to it through a reverse tunnel.
    Exec(ExecArgs),
}

/// Daemon layout shared by `serve` and `exec --serve`.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct DaemonArgs {
    /// Read-write module to expose under the root. Repeatable.
    #[arg(long = "module", value_name = "NAME")]
    pub(crate) modules: Vec<String>,
    /// Creates the root and module directories when they are missing.
    #[arg(long)]
    pub(crate) create_dirs: bool,
    /// Seconds to wait for the daemon to accept connections.
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    pub(crate) ready_timeout: u64,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ServeArgs {
    /// Directory exposed read-only as the `local` module.
    pub(crate) root: PathBuf,
    #[command(flatten)]
    pub(crate) daemon: DaemonArgs,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ExecArgs {
    /// Remote host.
    pub(crate) host: String,
    /// Script path on the remote host.
    pub(crate) script: String,
    /// Remote user.
    #[arg(long)]
    pub(crate) user: Option<String>,
    /// Private key used to authenticate.
    #[arg(long, value_name = "FILE")]
    pub(crate) key: Option<PathBuf>,
    /// Uploads before the script runs. Repeatable.
    #[arg(long, value_name = "LOCAL:REMOTE", value_parser = parse_transfer)]
    pub(crate) push: Vec<Transfer>,
    /// Downloads after the script succeeded. Repeatable.
    #[arg(long, value_name = "REMOTE:LOCAL", value_parser = parse_transfer)]
    pub(crate) pull: Vec<Transfer>,
    /// Serves this directory and forwards the daemon port to the remote host.
    #[arg(long, value_name = "ROOT")]
    pub(crate) serve: Option<PathBuf>,
    #[command(flatten)]
    pub(crate) daemon: DaemonArgs,
}

/// A `SOURCE:DESTINATION` pair, split at the first colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Transfer {
    pub(crate) source: String,
    pub(crate) destination: String,
}

fn parse_transfer(value: &str) -> Result<Transfer, String> {
    match value.split_once(':') {
        Some((source, destination)) if !source.is_empty() && !destination.is_empty() => {
            Ok(Transfer {
                source: source.to_owned(),
                destination: destination.to_owned(),
            })
        }
        _ => Err(format!("expected SOURCE:DESTINATION, got '{value}'")),
    }
}

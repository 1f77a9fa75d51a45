//! Separates the constants flags from the subcommand line.
//!
//! Constants flags must appear before the subcommand. The leading run of
//! recognised flags (and their values) is handed to [`Constants::from_args`];
//! everything from the first other token onwards is parsed by clap.
//!
//! [`Constants::from_args`]: provision_config::Constants::from_args

use std::ffi::{OsStr, OsString};

const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--rsync",
    "--rsync-port",
    "--ssh-port",
];

/// Program name followed by the constants flags, and program name followed by
/// the subcommand tokens.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    pub(crate) config: Vec<OsString>,
    pub(crate) command: Vec<OsString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let (flag, inline) = text
        .split_once('=')
        .map_or((&*text, false), |(name, _)| (name, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline,
        }
    } else {
        FlagAction::Stop
    }
}

pub(crate) fn split_arguments<I>(args: I) -> ArgumentSplit
where
    I: IntoIterator<Item = OsString>,
{
    let mut tokens = args.into_iter().peekable();
    let Some(program) = tokens.next() else {
        return ArgumentSplit::default();
    };
    let mut config = vec![program.clone()];
    while let Some(FlagAction::Include { needs_value }) =
        tokens.peek().map(|token| classify(token))
    {
        config.extend(tokens.next());
        if needs_value {
            config.extend(tokens.next());
        }
    }
    let command = std::iter::once(program).chain(tokens).collect();
    ArgumentSplit { config, command }
}

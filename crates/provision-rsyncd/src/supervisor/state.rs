//! Run-state bookkeeping for the supervised process.

use std::fmt;
use std::process::{Child, ExitStatus};

/// How a finished process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    code: Option<i32>,
}

impl ExitSummary {
    /// Summary for a process that exited with `code`, or was killed by a
    /// signal when `code` is `None`.
    #[must_use]
    pub const fn new(code: Option<i32>) -> Self {
        Self { code }
    }

    /// Exit code, absent when a signal terminated the process.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        self.code
    }

    /// Whether the process exited with status zero.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl From<ExitStatus> for ExitSummary {
    fn from(status: ExitStatus) -> Self {
        Self::new(status.code())
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Observable state of the supervised daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Spawned but not yet confirmed to accept connections.
    Starting,
    /// Accepting connections.
    Running,
    /// Ended on its own.
    Exited(ExitSummary),
    /// Terminated by the supervisor.
    Killed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Exited(summary) => write!(f, "exited ({summary})"),
            Self::Killed => f.write_str("killed"),
        }
    }
}

/// What a non-blocking probe of the process saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The handle was already released by teardown.
    Cleared,
    /// The process is still alive.
    Running,
    /// The process has run to completion.
    Exited(ExitSummary),
}

/// Owner of the OS handle. Teardown moves it from `Live` to `Stopped`.
#[derive(Debug)]
pub(super) enum ProcessSlot {
    Live(Child),
    Stopped(RunState),
}

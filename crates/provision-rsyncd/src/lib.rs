//! Supervisor for a short-lived local rsync daemon.
//!
//! A provisioning session needs somewhere for a remote host to push results
//! and pull inputs. This crate starts `rsync --daemon` bound to the loopback
//! interface, exposing a root directory read-only as the `local` module and
//! any number of named subdirectories read-write.
//!
//! The pieces, leaf first:
//!
//! - [`generate_config`] renders the daemon configuration. It is pure.
//! - [`ProcessSupervisor`] writes that configuration to a private temporary
//!   file, spawns the daemon, and owns the process handle.
//! - The health monitor probes the process every 500ms and escalates an
//!   unexpected exit exactly once.
//! - [`RsyncDaemon`] coordinates teardown through a tri-state lifecycle flag
//!   so disposal runs once, whether it is triggered by the owner, by Ctrl-C,
//!   or from a reporter callback.
//!
//! Faults surface through [`RsyncDaemon::wait`], [`RsyncDaemon::fault`] and the
//! [`DaemonReporter`] observer.

mod config;
mod daemon_spec;
mod error;
mod lifecycle;
mod monitor;
mod reporter;
mod supervisor;
pub mod telemetry;

pub use config::{ConfigFile, generate_config, render_config};
pub use daemon_spec::{DaemonSpec, LOCAL_MODULE, ModuleName, SpecError};
pub use error::{DaemonFault, SupervisorError, TeardownError};
pub use lifecycle::{
    CancellationHandle, CancellationPolicy, CancellationSource, LifecycleState, RsyncDaemon,
    RsyncDaemonBuilder, SigintCancellation,
};
pub use monitor::PROBE_INTERVAL;
pub use reporter::{DaemonReporter, StructuredReporter};
pub use supervisor::{ExitSummary, LISTEN_ADDRESS, Observation, ProcessSupervisor, RunState};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;

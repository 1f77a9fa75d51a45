//! Structured reporting of daemon lifecycle events.

use std::sync::Arc;

use crate::daemon_spec::{DaemonSpec, ModuleName};
use crate::error::{DaemonFault, TeardownError};
use crate::lifecycle::CancellationPolicy;

const REPORTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer notified about lifecycle events of a supervised daemon.
///
/// Callbacks may run on the monitor or cancellation threads, so
/// implementations must not block for long.
pub trait DaemonReporter: Send + Sync {
    /// Invoked once the daemon process has been spawned.
    fn daemon_started(&self, spec: &DaemonSpec, pid: u32);

    /// Invoked when the daemon first accepts connections.
    fn daemon_ready(&self, port: u16);

    /// Invoked exactly once when the health monitor records a fatal fault.
    fn daemon_failed(&self, fault: &DaemonFault);

    /// Invoked for every interactive cancellation request.
    fn cancellation_received(&self, policy: CancellationPolicy);

    /// Invoked for each best-effort teardown step that failed.
    fn teardown_failed(&self, error: &TeardownError);

    /// Invoked once teardown has finished.
    fn daemon_disposed(&self);
}

impl<T> DaemonReporter for Arc<T>
where
    T: DaemonReporter + ?Sized,
{
    fn daemon_started(&self, spec: &DaemonSpec, pid: u32) {
        (**self).daemon_started(spec, pid);
    }

    fn daemon_ready(&self, port: u16) {
        (**self).daemon_ready(port);
    }

    fn daemon_failed(&self, fault: &DaemonFault) {
        (**self).daemon_failed(fault);
    }

    fn cancellation_received(&self, policy: CancellationPolicy) {
        (**self).cancellation_received(policy);
    }

    fn teardown_failed(&self, error: &TeardownError) {
        (**self).teardown_failed(error);
    }

    fn daemon_disposed(&self) {
        (**self).daemon_disposed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredReporter;

impl StructuredReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DaemonReporter for StructuredReporter {
    fn daemon_started(&self, spec: &DaemonSpec, pid: u32) {
        let modules: Vec<&str> = spec.modules().iter().map(ModuleName::as_str).collect();
        tracing::info!(
            target: REPORTER_TARGET,
            event = "daemon_started",
            pid,
            port = spec.port(),
            root = %spec.root().display(),
            modules = ?modules,
            "rsync daemon started"
        );
    }

    fn daemon_ready(&self, port: u16) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "daemon_ready",
            port,
            "rsync daemon ready"
        );
    }

    fn daemon_failed(&self, fault: &DaemonFault) {
        tracing::error!(
            target: REPORTER_TARGET,
            event = "daemon_failed",
            error = %fault,
            "rsync daemon failed"
        );
    }

    fn cancellation_received(&self, policy: CancellationPolicy) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "cancellation_received",
            policy = %policy,
            "program cancelled"
        );
    }

    fn teardown_failed(&self, error: &TeardownError) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "teardown_failed",
            error = %error,
            "rsync daemon teardown step failed"
        );
    }

    fn daemon_disposed(&self) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "daemon_disposed",
            "rsync daemon disposed"
        );
    }
}

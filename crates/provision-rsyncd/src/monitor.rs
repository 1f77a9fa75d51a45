//! Periodic liveness probe for the supervised daemon.
//!
//! The monitor runs on its own thread and probes the process every
//! [`PROBE_INTERVAL`]. Each probe is classified by [`evaluate`], which is pure
//! so the escalation rules can be tested without a process. The first fault
//! ends the loop, so escalation happens at most once per monitor.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::DaemonFault;
use crate::lifecycle::{LifecycleFlag, LifecycleState};
use crate::supervisor::{Observation, ProcessSupervisor};

pub(crate) const MONITOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::monitor");

/// Default period between two probes.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Classification of a single probe.
#[derive(Debug)]
pub(crate) enum ProbeOutcome {
    /// The process is alive.
    Healthy,
    /// Teardown is under way or already released the handle; nothing to do.
    Idle,
    /// A fatal condition that must be escalated.
    Fault(DaemonFault),
}

/// Decides what one probe means for the daemon.
///
/// Nothing is escalated once disposal has begun or the handle was cleared. A
/// non-zero exit seen on the very first probe is a launch failure; any other
/// exit while active is an unexpected termination.
pub(crate) fn evaluate(
    state: LifecycleState,
    observation: io::Result<Observation>,
    first_probe: bool,
) -> ProbeOutcome {
    if state != LifecycleState::Active {
        return ProbeOutcome::Idle;
    }
    match observation {
        Ok(Observation::Cleared) => ProbeOutcome::Idle,
        Ok(Observation::Running) => ProbeOutcome::Healthy,
        Ok(Observation::Exited(status)) if first_probe && !status.success() => {
            ProbeOutcome::Fault(DaemonFault::ExitedEarly { status })
        }
        Ok(Observation::Exited(status)) => {
            ProbeOutcome::Fault(DaemonFault::UnexpectedTermination { status })
        }
        Err(error) => ProbeOutcome::Fault(DaemonFault::ProbeFailed {
            source: Arc::new(error),
        }),
    }
}

/// Handle to a running monitor thread.
#[derive(Debug)]
pub(crate) struct HealthMonitor {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Starts probing `supervisor` every `interval`.
    ///
    /// `on_fault` runs on the monitor thread at most once, after which the
    /// monitor stops scheduling itself.
    pub(crate) fn spawn<F>(
        supervisor: Arc<ProcessSupervisor>,
        flag: Arc<LifecycleFlag>,
        interval: Duration,
        on_fault: F,
    ) -> io::Result<Self>
    where
        F: FnOnce(DaemonFault) + Send + 'static,
    {
        let (stop, ticks) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("rsyncd-monitor".to_owned())
            .spawn(move || {
                let mut first_probe = true;
                loop {
                    match ticks.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let outcome = evaluate(flag.load(), supervisor.observe(), first_probe);
                    first_probe = false;
                    match outcome {
                        ProbeOutcome::Healthy | ProbeOutcome::Idle => {}
                        ProbeOutcome::Fault(fault) => {
                            warn!(
                                target: MONITOR_TARGET,
                                pid = supervisor.pid(),
                                error = %fault,
                                "rsync daemon fault detected"
                            );
                            on_fault(fault);
                            break;
                        }
                    }
                }
                debug!(target: MONITOR_TARGET, pid = supervisor.pid(), "monitor stopped");
            })?;
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Cancels future probes and waits for the thread, unless called from the
    /// monitor thread itself. Idempotent.
    pub(crate) fn stop(&mut self) {
        drop(self.stop.take());
        let Some(handle) = self.thread.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(target: MONITOR_TARGET, "monitor thread panicked");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

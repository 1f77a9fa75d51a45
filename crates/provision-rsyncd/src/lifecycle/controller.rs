//! The [`RsyncDaemon`] controller and its builder.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use provision_config::{Constants, DEFAULT_RSYNC_BINARY, DEFAULT_RSYNC_PORT};
use tracing::{debug, error, info, warn};

use super::LIFECYCLE_TARGET;
use super::cancellation::{
    CancellationListener, CancellationPolicy, CancellationSource, SigintCancellation,
};
use super::state::{LifecycleFlag, LifecycleState};
use crate::daemon_spec::DaemonSpec;
use crate::error::{DaemonFault, SupervisorError, TeardownError};
use crate::monitor::{HealthMonitor, PROBE_INTERVAL};
use crate::reporter::{DaemonReporter, StructuredReporter};
use crate::supervisor::{ProcessSupervisor, RunState};

#[derive(Debug)]
enum Outcome {
    Running,
    Disposed,
    Faulted(DaemonFault),
}

/// State shared between the controller, the monitor and the cancellation
/// listener.
pub(crate) struct Shared {
    supervisor: Arc<ProcessSupervisor>,
    flag: Arc<LifecycleFlag>,
    reporter: Arc<dyn DaemonReporter>,
    outcome: Mutex<Outcome>,
    changed: Condvar,
    fault_observed: AtomicBool,
    monitor: Mutex<Option<HealthMonitor>>,
    listener: Mutex<Option<CancellationListener>>,
}

impl Shared {
    pub(crate) fn reporter(&self) -> &dyn DaemonReporter {
        self.reporter.as_ref()
    }

    fn record_fault(&self, fault: DaemonFault) {
        {
            let mut outcome = lock(&self.outcome);
            if !matches!(*outcome, Outcome::Running) {
                return;
            }
            *outcome = Outcome::Faulted(fault.clone());
            self.changed.notify_all();
        }
        self.reporter.daemon_failed(&fault);
    }

    /// Tears the daemon down once; later and concurrent calls return at once.
    ///
    /// Every step runs even when an earlier one failed. The first failure is
    /// returned and all of them are reported.
    pub(crate) fn dispose(&self) -> Result<(), TeardownError> {
        if !self.flag.begin_disposal() {
            return Ok(());
        }
        debug!(
            target: LIFECYCLE_TARGET,
            pid = self.supervisor.pid(),
            "disposing rsync daemon"
        );
        let monitor_slot = lock(&self.monitor).take();
        if let Some(mut monitor) = monitor_slot {
            monitor.stop();
        }
        let listener_slot = lock(&self.listener).take();
        if let Some(mut listener) = listener_slot {
            listener.close();
        }

        let mut first_failure = None;
        self.note_teardown(self.supervisor.stop(), &mut first_failure);
        self.note_teardown(self.supervisor.remove_config(), &mut first_failure);

        self.flag.finish_disposal();
        {
            let mut outcome = lock(&self.outcome);
            if matches!(*outcome, Outcome::Running) {
                *outcome = Outcome::Disposed;
            }
            self.changed.notify_all();
        }
        self.reporter.daemon_disposed();
        first_failure.map_or(Ok(()), Err)
    }

    fn note_teardown(
        &self,
        result: Result<(), TeardownError>,
        first_failure: &mut Option<TeardownError>,
    ) {
        let Err(failure) = result else {
            return;
        };
        warn!(
            target: LIFECYCLE_TARGET,
            pid = self.supervisor.pid(),
            error = %failure,
            "teardown step failed"
        );
        self.reporter.teardown_failed(&failure);
        if first_failure.is_none() {
            *first_failure = Some(failure);
        }
    }

    fn wait(&self) -> Result<(), DaemonFault> {
        let mut outcome = lock(&self.outcome);
        loop {
            match &*outcome {
                Outcome::Running => {}
                Outcome::Disposed => return Ok(()),
                Outcome::Faulted(fault) => {
                    self.fault_observed.store(true, Ordering::Release);
                    return Err(fault.clone());
                }
            }
            outcome = self
                .changed
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn fault(&self) -> Option<DaemonFault> {
        let outcome = lock(&self.outcome);
        let Outcome::Faulted(fault) = &*outcome else {
            return None;
        };
        self.fault_observed.store(true, Ordering::Release);
        Some(fault.clone())
    }

    fn unobserved_fault(&self) -> Option<DaemonFault> {
        if self.fault_observed.load(Ordering::Acquire) {
            return None;
        }
        match &*lock(&self.outcome) {
            Outcome::Faulted(fault) => Some(fault.clone()),
            Outcome::Running | Outcome::Disposed => None,
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("pid", &self.supervisor.pid())
            .field("state", &self.flag.load())
            .finish_non_exhaustive()
    }
}

/// A supervised local rsync daemon.
///
/// Starting spawns the daemon, attaches the health monitor and registers the
/// cancellation listener. Teardown happens exactly once, through
/// [`dispose`](Self::dispose) or on drop.
///
/// ```no_run
/// use std::time::Duration;
/// use provision_rsyncd::RsyncDaemon;
///
/// let daemon = RsyncDaemon::builder("/tmp/rsync").port(2222).module("log").start()?;
/// daemon.wait_until_ready(Duration::from_secs(5))?;
/// // rsync file.txt rsync://127.0.0.1:2222/log/file.txt
/// daemon.dispose()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct RsyncDaemon {
    shared: Arc<Shared>,
}

impl RsyncDaemon {
    /// Starts configuring a daemon serving `root`.
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> RsyncDaemonBuilder {
        RsyncDaemonBuilder::new(root)
    }

    /// Specification the daemon runs with.
    #[must_use]
    pub fn spec(&self) -> &DaemonSpec {
        self.shared.supervisor.spec()
    }

    /// OS process identifier of the daemon.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.shared.supervisor.pid()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.shared.flag.load()
    }

    /// Current state of the daemon process.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.shared.supervisor.state()
    }

    /// Path of the generated configuration until teardown removes it.
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        self.shared.supervisor.config_path()
    }

    /// Blocks until the daemon accepts connections.
    ///
    /// # Errors
    ///
    /// See [`ProcessSupervisor::wait_until_listening`].
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<(), SupervisorError> {
        self.shared.supervisor.wait_until_listening(timeout)?;
        self.shared
            .reporter
            .daemon_ready(self.shared.supervisor.spec().port());
        Ok(())
    }

    /// Stops the monitor, kills the daemon and removes its configuration.
    ///
    /// Safe to call any number of times, from any thread, including from
    /// reporter callbacks. Only the first call does any work.
    ///
    /// # Errors
    ///
    /// Returns the first [`TeardownError`]; the remaining steps still run.
    pub fn dispose(&self) -> Result<(), TeardownError> {
        self.shared.dispose()
    }

    /// Blocks until the daemon is disposed (`Ok`) or faults (`Err`).
    ///
    /// # Errors
    ///
    /// Returns the recorded [`DaemonFault`].
    pub fn wait(&self) -> Result<(), DaemonFault> {
        self.shared.wait()
    }

    /// The recorded fault, if any, without blocking.
    #[must_use]
    pub fn fault(&self) -> Option<DaemonFault> {
        self.shared.fault()
    }
}

impl Drop for RsyncDaemon {
    fn drop(&mut self) {
        if let Err(error) = self.shared.dispose() {
            warn!(
                target: LIFECYCLE_TARGET,
                error = %error,
                "teardown on drop failed"
            );
        }
        if let Some(fault) = self.shared.unobserved_fault() {
            error!(
                target: LIFECYCLE_TARGET,
                pid = self.shared.supervisor.pid(),
                error = %fault,
                "rsync daemon fault was never observed"
            );
        }
    }
}

/// Builder for [`RsyncDaemon`].
pub struct RsyncDaemonBuilder {
    root: PathBuf,
    port: u16,
    modules: Vec<String>,
    binary: OsString,
    policy: CancellationPolicy,
    reporter: Arc<dyn DaemonReporter>,
    cancellation: Option<Box<dyn CancellationSource>>,
    probe_interval: Duration,
}

impl RsyncDaemonBuilder {
    fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            port: DEFAULT_RSYNC_PORT,
            modules: Vec::new(),
            binary: OsString::from(DEFAULT_RSYNC_BINARY),
            policy: CancellationPolicy::default(),
            reporter: Arc::new(StructuredReporter::new()),
            cancellation: None,
            probe_interval: PROBE_INTERVAL,
        }
    }

    /// Takes the port and binary from resolved constants.
    #[must_use]
    pub fn constants(mut self, constants: &Constants) -> Self {
        self.port = constants.rsync_port();
        self.binary = OsString::from(constants.rsync_binary());
        self
    }

    /// Loopback port to listen on.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Adds a read-write module.
    #[must_use]
    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.modules.push(name.into());
        self
    }

    /// Adds several read-write modules in order.
    #[must_use]
    pub fn modules<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.extend(names.into_iter().map(Into::into));
        self
    }

    /// rsync executable to run.
    #[must_use]
    pub fn binary(mut self, binary: impl Into<OsString>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Reaction to interactive cancellation.
    ///
    /// With the default `SIGINT` source, Ctrl-C never terminates the process
    /// while the daemon is supervised, whatever the policy. Once the daemon is
    /// disposed the default `SIGINT` action is restored.
    #[must_use]
    pub const fn cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the `SIGINT` listener with another cancellation source.
    #[must_use]
    pub fn cancellation_source(mut self, source: impl CancellationSource) -> Self {
        self.cancellation = Some(Box::new(source));
        self
    }

    /// Observer for lifecycle events.
    #[must_use]
    pub fn reporter(mut self, reporter: impl DaemonReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Period between two health probes.
    #[must_use]
    pub const fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Validates the layout, launches the daemon and attaches supervision.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the layout is invalid, the listener
    /// cannot be installed, the configuration cannot be written, the binary
    /// cannot be launched, or a supervision thread cannot be spawned. Anything
    /// already started is torn down before returning.
    pub fn start(self) -> Result<RsyncDaemon, SupervisorError> {
        let spec = DaemonSpec::new(self.root, self.port, self.modules)?;
        let cancellation = match self.cancellation {
            Some(custom) => custom,
            None => Box::new(
                SigintCancellation::install()
                    .map_err(|source| SupervisorError::Cancellation { source })?,
            ),
        };
        let supervisor = Arc::new(ProcessSupervisor::start(spec, &self.binary)?);
        self.reporter
            .daemon_started(supervisor.spec(), supervisor.pid());

        let shared = Arc::new(Shared {
            supervisor: Arc::clone(&supervisor),
            flag: Arc::new(LifecycleFlag::new()),
            reporter: self.reporter,
            outcome: Mutex::new(Outcome::Running),
            changed: Condvar::new(),
            fault_observed: AtomicBool::new(false),
            monitor: Mutex::new(None),
            listener: Mutex::new(None),
        });
        let daemon = RsyncDaemon {
            shared: Arc::clone(&shared),
        };

        let weak = Arc::downgrade(&shared);
        let monitor = HealthMonitor::spawn(
            supervisor,
            Arc::clone(&shared.flag),
            self.probe_interval,
            move |fault| {
                if let Some(controller) = weak.upgrade() {
                    controller.record_fault(fault);
                }
            },
        )
        .map_err(|source| SupervisorError::Thread {
            name: "monitor",
            source,
        })?;
        *lock(&shared.monitor) = Some(monitor);

        let listener =
            CancellationListener::spawn(cancellation, self.policy, Arc::downgrade(&shared)).map_err(
                |source| SupervisorError::Thread {
                    name: "cancellation",
                    source,
                },
            )?;
        *lock(&shared.listener) = Some(listener);

        info!(
            target: LIFECYCLE_TARGET,
            pid = daemon.pid(),
            policy = %self.policy,
            "rsync daemon supervised"
        );
        Ok(daemon)
    }
}

impl fmt::Debug for RsyncDaemonBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsyncDaemonBuilder")
            .field("root", &self.root)
            .field("port", &self.port)
            .field("modules", &self.modules)
            .field("binary", &self.binary)
            .field("policy", &self.policy)
            .field("probe_interval", &self.probe_interval)
            .finish_non_exhaustive()
    }
}

// Outcome, monitor and listener slots are replaced wholesale, so a poisoned
// lock still guards a consistent value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

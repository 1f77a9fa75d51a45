//! Interactive cancellation (Ctrl-C) handling.
//!
//! While a [`SigintCancellation`] is open, `SIGINT` is consumed by the
//! listener and never terminates the process. Closing it restores the
//! default action, so a Ctrl-C after teardown ends the program as usual.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::SIGINT;
use signal_hook::flag;
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, warn};

use super::LIFECYCLE_TARGET;
use super::controller::Shared;

/// What the controller does when an interactive cancellation arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancellationPolicy {
    /// Log the request and keep the daemon running. The process is not
    /// terminated either; the caller decides when to dispose.
    #[default]
    Acknowledge,
    /// Tear the daemon down.
    Dispose,
}

impl fmt::Display for CancellationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acknowledge => f.write_str("acknowledge"),
            Self::Dispose => f.write_str("dispose"),
        }
    }
}

/// Source of cancellation requests.
pub trait CancellationSource: Send + 'static {
    /// Returns a handle that makes [`wait`](Self::wait) return `false`.
    fn handle(&self) -> Box<dyn CancellationHandle>;

    /// Blocks until a request arrives (`true`) or the source is closed
    /// (`false`).
    fn wait(&mut self) -> bool;
}

/// Closes a [`CancellationSource`] from another thread.
pub trait CancellationHandle: Send + Sync {
    /// Stops delivery. Idempotent.
    fn close(&self);
}

/// Cancellation source fed by `SIGINT`.
pub struct SigintCancellation {
    signals: Signals,
    released: Arc<AtomicBool>,
}

impl SigintCancellation {
    /// Registers the `SIGINT` handler.
    ///
    /// A second handler stays dormant until the source is closed and then
    /// performs the default action, terminating the process.
    ///
    /// # Errors
    ///
    /// Returns the OS error when either handler cannot be installed.
    pub fn install() -> io::Result<Self> {
        let released = Arc::new(AtomicBool::new(false));
        flag::register_conditional_default(SIGINT, Arc::clone(&released))?;
        Ok(Self {
            signals: Signals::new([SIGINT])?,
            released,
        })
    }
}

/// Closes a [`SigintCancellation`] and hands `SIGINT` back to its default
/// action.
struct SigintHandle {
    handle: Handle,
    released: Arc<AtomicBool>,
}

impl CancellationHandle for SigintHandle {
    fn close(&self) {
        self.handle.close();
        self.released.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for SigintCancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigintCancellation").finish_non_exhaustive()
    }
}

impl CancellationSource for SigintCancellation {
    fn handle(&self) -> Box<dyn CancellationHandle> {
        Box::new(SigintHandle {
            handle: self.signals.handle(),
            released: Arc::clone(&self.released),
        })
    }

    fn wait(&mut self) -> bool {
        self.signals.forever().next().is_some()
    }
}

/// Thread relaying cancellation requests to the controller.
pub(crate) struct CancellationListener {
    handle: Box<dyn CancellationHandle>,
    thread: Option<JoinHandle<()>>,
}

impl CancellationListener {
    pub(crate) fn spawn(
        mut source: Box<dyn CancellationSource>,
        policy: CancellationPolicy,
        controller: Weak<Shared>,
    ) -> io::Result<Self> {
        let handle = source.handle();
        let thread = thread::Builder::new()
            .name("rsyncd-cancel".to_owned())
            .spawn(move || {
                while source.wait() {
                    let Some(shared) = controller.upgrade() else {
                        break;
                    };
                    shared.reporter().cancellation_received(policy);
                    if policy == CancellationPolicy::Dispose
                        && let Err(error) = shared.dispose()
                    {
                        warn!(
                            target: LIFECYCLE_TARGET,
                            error = %error,
                            "teardown after cancellation failed"
                        );
                    }
                }
                debug!(target: LIFECYCLE_TARGET, "cancellation listener closed");
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Closes the source and joins the thread unless called from it.
    pub(crate) fn close(&mut self) {
        self.handle.close();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!(target: LIFECYCLE_TARGET, "cancellation listener panicked");
        }
    }
}

impl fmt::Debug for CancellationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationListener")
            .field("attached", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for CancellationListener {
    fn drop(&mut self) {
        self.close();
    }
}

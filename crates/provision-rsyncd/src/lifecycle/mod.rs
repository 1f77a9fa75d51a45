//! Lifecycle coordination for the supervised daemon.
//!
//! - [`state`] holds the tri-state flag that makes teardown run once.
//! - [`cancellation`] relays interactive cancellation according to a policy.
//! - [`controller`] wires supervisor, monitor and listener into
//!   [`RsyncDaemon`].

mod cancellation;
mod controller;
mod state;

pub use cancellation::{
    CancellationHandle, CancellationPolicy, CancellationSource, SigintCancellation,
};
pub use controller::{RsyncDaemon, RsyncDaemonBuilder};
pub use state::LifecycleState;

pub(crate) use state::LifecycleFlag;

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

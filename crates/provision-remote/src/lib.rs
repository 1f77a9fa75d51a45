//! Remote session wrapper for provisioning sessions.
//!
//! [`RemoteSession`] drives the system `ssh` and `scp` clients. Connecting
//! starts one control-master process that carries the requested port
//! forwards; every later push, pull and remote execution multiplexes over its
//! control socket, so authentication happens once.
//!
//! ```no_run
//! use provision_remote::{RemoteSession, Severity};
//!
//! let session = RemoteSession::new("builder.example.org")
//!     .user("ci")
//!     .key_file("/home/ci/.ssh/id_ed25519")
//!     .forward_remote(2873, 2873)
//!     .connect()?;
//! session
//!     .push("inputs", "/tmp/inputs")?
//!     .execute("/tmp/inputs/provision.sh", |severity, line| {
//!         if severity == Severity::Error {
//!             eprintln!("{line}");
//!         }
//!     })?
//!     .pull("/tmp/outputs", "outputs")?;
//! # Ok::<(), provision_remote::SessionError>(())
//! ```

mod error;
mod session;
mod severity;

pub use error::SessionError;
pub use session::{Forward, RemoteSession};
pub use severity::{OutputStream, Severity};

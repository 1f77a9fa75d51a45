//! Forwards the daemon's output streams into the log.

use std::io::{BufRead, BufReader, Read};
use std::thread;

use tracing::{debug, warn};

use super::PROCESS_TARGET;

/// Drains `stream` on a detached thread, logging each line at debug level.
///
/// The thread ends at end-of-file. It is never joined, since forked rsync
/// children may hold the pipe open after the parent is killed.
pub(super) fn forward_lines<R>(stream: R, pid: u32, name: &'static str)
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("rsyncd-{name}"))
        .spawn(move || {
            for line in BufReader::new(stream).lines() {
                match line {
                    Ok(line) => debug!(
                        target: PROCESS_TARGET,
                        pid,
                        stream = name,
                        line = %line,
                        "rsync output"
                    ),
                    Err(error) => {
                        debug!(
                            target: PROCESS_TARGET,
                            pid,
                            stream = name,
                            error = %error,
                            "stopped forwarding rsync output"
                        );
                        break;
                    }
                }
            }
        });
    if let Err(error) = spawned {
        warn!(
            target: PROCESS_TARGET,
            pid,
            stream = name,
            error = %error,
            "failed to start output forwarder"
        );
    }
}

//! Line-oriented reading of client output.

use std::io::{self, BufRead, BufReader, Read};
use std::process::Child;
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use super::SESSION_TARGET;
use crate::severity::{OutputStream, Severity};

/// Feeds every line the child writes to `callback`, classified by severity,
/// until both streams reach end-of-file.
///
/// Lines are delivered on the calling thread in arrival order. Invalid UTF-8
/// is replaced rather than rejected.
pub(super) fn relay_lines<F>(child: &mut Child, mut callback: F) -> io::Result<()>
where
    F: FnMut(Severity, &str),
{
    let (lines, received) = mpsc::channel::<(OutputStream, io::Result<String>)>();
    thread::scope(|scope| {
        if let Some(stdout) = child.stdout.take() {
            let sender = lines.clone();
            scope.spawn(move || read_into(stdout, OutputStream::Stdout, &sender));
        }
        if let Some(stderr) = child.stderr.take() {
            let sender = lines.clone();
            scope.spawn(move || read_into(stderr, OutputStream::Stderr, &sender));
        }
        drop(lines);
        let mut failure = None;
        for (stream, read) in received {
            match read {
                Ok(line) => {
                    let (severity, message) = Severity::classify(stream, &line);
                    callback(severity, message);
                }
                Err(error) => {
                    failure.get_or_insert(error);
                }
            }
        }
        failure.map_or(Ok(()), Err)
    })
}

fn read_into<R: Read>(
    stream: R,
    name: OutputStream,
    lines: &mpsc::Sender<(OutputStream, io::Result<String>)>,
) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => return,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buffer);
                let line = decoded.trim_end_matches(['\n', '\r']).to_owned();
                if lines.send((name, Ok(line))).is_err() {
                    return;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                lines.send((name, Err(error))).ok();
                return;
            }
        }
    }
}

/// Drains `stream` on a detached thread into the debug log.
pub(super) fn log_lines<R>(stream: R, name: &'static str)
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else {
                    break;
                };
                debug!(target: SESSION_TARGET, stream = name, line = %line, "ssh output");
            }
        });
    if let Err(error) = spawned {
        warn!(
            target: SESSION_TARGET,
            stream = name,
            error = %error,
            "failed to start output reader"
        );
    }
}

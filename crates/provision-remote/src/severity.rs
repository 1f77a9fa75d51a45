//! Classification of remote output lines.

use strum::Display;

/// Severity attached to a line of remote output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Line carried a `DEBUG` prefix.
    Debug,
    /// Line carried an `INFO` prefix.
    Info,
    /// Line carried a `WARN` prefix.
    Warn,
    /// Line carried an `ERROR` prefix, or was unprefixed on stderr.
    Error,
    /// Regular unprefixed output on stdout.
    Output,
}

/// Stream a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

const PREFIXES: [(&str, Severity); 4] = [
    ("DEBUG", Severity::Debug),
    ("INFO", Severity::Info),
    ("WARN", Severity::Warn),
    ("ERROR", Severity::Error),
];

impl Severity {
    /// Splits a line into its severity and message.
    ///
    /// A leading `DEBUG`, `INFO`, `WARN` or `ERROR` token, followed by a colon,
    /// whitespace or the end of the line, selects the severity and is stripped
    /// together with the separator. Other lines keep their text and are
    /// [`Severity::Output`] on stdout and [`Severity::Error`] on stderr.
    #[must_use]
    pub fn classify(stream: OutputStream, line: &str) -> (Self, &str) {
        for (prefix, severity) in PREFIXES {
            if let Some(message) = strip_token(line, prefix) {
                return (severity, message);
            }
        }
        let severity = match stream {
            OutputStream::Stdout => Self::Output,
            OutputStream::Stderr => Self::Error,
        };
        (severity, line)
    }
}

fn strip_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(token)?;
    let message = match rest.strip_prefix(':') {
        Some(after_colon) => after_colon,
        None if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        None => return None,
    };
    Some(message.trim_start())
}

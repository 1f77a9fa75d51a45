//! Log output for the supervisor and the binaries built on it.
//!
//! Records go to stderr so stdout stays free for the prompt and remote script
//! output. Thread names are included: the monitor (`rsyncd-monitor`), the
//! Ctrl-C listener (`rsyncd-cancel`) and the output forwarders
//! (`rsyncd-stdout`, `rsyncd-stderr`) each log from their own thread.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use provision_config::{LogFormat, LogSettings};
use tracing::Subscriber;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, time::UtcTime};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that a subscriber is installed, carrying the format that won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the subscriber installed by the first successful call.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter directive did not parse.
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        /// Directive as configured.
        filter: String,
        /// Parser diagnostic.
        #[source]
        source: ParseError,
    },
    /// Another subscriber already owns the process.
    #[error("failed to install log subscriber: {source}")]
    Subscriber {
        /// Rejection from `tracing`.
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Installs the process-wide subscriber the first time it is called.
///
/// Later calls keep the first subscriber and report its format, whatever
/// settings they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for a malformed filter and
/// [`TelemetryError::Subscriber`] when a foreign subscriber is already set.
pub fn initialise(settings: &LogSettings) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(settings).map(|()| settings.format()))
        .map(|format| TelemetryHandle { format: *format })
}

fn install(settings: &LogSettings) -> Result<(), TelemetryError> {
    let subscriber = build(settings)?;
    set_global_default(subscriber).map_err(|source| TelemetryError::Subscriber { source })
}

fn build(settings: &LogSettings) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter = EnvFilter::try_new(settings.filter()).map_err(|source| {
        TelemetryError::Filter {
            filter: settings.filter().to_owned(),
            source,
        }
    })?;
    let stderr = io::stderr();
    let base = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(stderr.is_terminal())
        .with_target(true)
        .with_thread_names(true)
        .with_timer(UtcTime::rfc_3339());
    Ok(match settings.format() {
        LogFormat::Json => Box::new(base.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(base.compact().finish()),
    })
}

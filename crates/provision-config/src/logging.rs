//! Log output preferences carried by the constants.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::defaults::{default_log_filter, default_log_format};

/// Shape of the log lines written to stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened to the top level.
    Json,
    /// Terse text, one event per line.
    #[default]
    Compact,
}

/// Rejection of a `PROVISION_LOG_FORMAT` value other than `json` or `compact`.
pub type LogFormatParseError = strum::ParseError;

/// Logging preferences resolved alongside the other constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    filter: String,
    format: LogFormat,
}

impl LogSettings {
    /// Builds settings from an explicit filter expression and format.
    #[must_use]
    pub fn new(filter: impl Into<String>, format: LogFormat) -> Self {
        Self {
            filter: filter.into(),
            format,
        }
    }

    /// Filter expression understood by `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Output format of the log lines.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self::new(default_log_filter(), default_log_format())
    }
}

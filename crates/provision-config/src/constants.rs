//! Immutable constants registry resolved once at process start.
//!
//! Values are layered by `ortho_config`: command-line flags win over
//! environment variables, which win over an optional `.provision.toml`, which
//! wins over the built-in defaults.
//!
//! | Variable                | Flag            | Constant      | Default   |
//! |-------------------------|-----------------|---------------|-----------|
//! | `PROVISION_LOG_FILTER`  | `--log-filter`  | `LOG_FILTER`  | `info`    |
//! | `PROVISION_LOG_FORMAT`  | `--log-format`  | `LOG_FORMAT`  | `compact` |
//! | `PROVISION_RSYNC`       | `--rsync`       | `RSYNC`       | `rsync`   |
//! | `PROVISION_RSYNC_PORT`  | `--rsync-port`  | `RSYNC_PORT`  | `2873`    |
//! | `PROVISION_SSH_PORT`    | `--ssh-port`    | `SSH_PORT`    | `22`      |
//!
//! An empty value counts as unset. A value that cannot be coerced to the
//! constant's type fails the load and the error names the constant.

use std::ffi::OsString;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::defaults::{
    DEFAULT_RSYNC_BINARY, DEFAULT_RSYNC_PORT, DEFAULT_SSH_PORT, default_log_filter,
    default_log_format,
};
use crate::logging::{LogFormat, LogSettings};

/// Process-wide defaults consumed by the supervisor, the remote session, and
/// the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PROVISION")]
pub struct Constants {
    /// Port the local rsync daemon listens on.
    #[serde(default = "rsync_port_default", deserialize_with = "rsync_port")]
    rsync_port: u16,
    /// Name or path of the rsync executable.
    #[serde(default = "rsync_default", deserialize_with = "rsync")]
    rsync: String,
    /// SSH port of the remote peer.
    #[serde(default = "ssh_port_default", deserialize_with = "ssh_port")]
    ssh_port: u16,
    /// Filter expression for the log subscriber.
    #[serde(default = "log_filter_default", deserialize_with = "log_filter")]
    log_filter: String,
    /// Output format of the log lines.
    #[serde(default = "default_log_format", deserialize_with = "log_format")]
    log_format: LogFormat,
}

impl Constants {
    /// Resolves the constants from the environment and configuration files,
    /// without command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a layer holds a value that cannot be
    /// coerced to the constant's type.
    pub fn from_env() -> Result<Self, Arc<OrthoError>> {
        Self::from_args([OsString::from(env!("CARGO_PKG_NAME"))])
    }

    /// Resolves the constants with flags taken from `args`.
    ///
    /// The first item is the program name. The remaining items are the flags
    /// from the module table plus `--config-path`.
    ///
    /// # Errors
    ///
    /// Returns the loader error for unknown flags and for values that cannot
    /// be coerced to the constant's type.
    pub fn from_args<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::load_from_iter(args)
    }

    /// Port the local rsync daemon listens on.
    #[must_use]
    pub const fn rsync_port(&self) -> u16 {
        self.rsync_port
    }

    /// Name or path of the rsync executable.
    #[must_use]
    pub fn rsync_binary(&self) -> &str {
        &self.rsync
    }

    /// SSH port of the remote peer.
    #[must_use]
    pub const fn ssh_port(&self) -> u16 {
        self.ssh_port
    }

    /// Logging preferences.
    #[must_use]
    pub fn log_settings(&self) -> LogSettings {
        LogSettings::new(self.log_filter.clone(), self.log_format)
    }

    /// Returns a copy with a different rsync port.
    #[must_use]
    pub const fn with_rsync_port(mut self, port: u16) -> Self {
        self.rsync_port = port;
        self
    }

    /// Returns a copy with a different rsync executable.
    #[must_use]
    pub fn with_rsync_binary(mut self, binary: impl Into<String>) -> Self {
        self.rsync = binary.into();
        self
    }

    /// Returns a copy with a different SSH port.
    #[must_use]
    pub const fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Lists every constant as `(NAME, value)` ordered by name.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("LOG_FILTER", self.log_filter.clone()),
            ("LOG_FORMAT", self.log_format.to_string()),
            ("RSYNC", self.rsync.clone()),
            ("RSYNC_PORT", self.rsync_port.to_string()),
            ("SSH_PORT", self.ssh_port.to_string()),
        ]
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            rsync_port: DEFAULT_RSYNC_PORT,
            rsync: rsync_default(),
            ssh_port: DEFAULT_SSH_PORT,
            log_filter: log_filter_default(),
            log_format: default_log_format(),
        }
    }
}

impl Display for Constants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.entries() {
            writeln!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

/// Scalar shapes a layer may hand over; environment values arrive as
/// whatever figment guessed from the text.
#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Unsigned(u64),
    Signed(i64),
    Decimal(f64),
    Flag(bool),
    Text(String),
}

impl Raw {
    fn into_text(self) -> String {
        match self {
            Self::Unsigned(value) => value.to_string(),
            Self::Signed(value) => value.to_string(),
            Self::Decimal(value) => value.to_string(),
            Self::Flag(value) => value.to_string(),
            Self::Text(value) => value,
        }
    }
}

fn coerce<'de, D, T>(
    deserializer: D,
    name: &str,
    expected: &str,
    fallback: fn() -> T,
) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let text = Raw::deserialize(deserializer)?.into_text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(fallback());
    }
    trimmed.parse().map_err(|error| {
        D::Error::custom(format!(
            "{name} value '{text}' is not a valid {expected}: {error}"
        ))
    })
}

const fn rsync_port_default() -> u16 {
    DEFAULT_RSYNC_PORT
}

const fn ssh_port_default() -> u16 {
    DEFAULT_SSH_PORT
}

fn rsync_default() -> String {
    DEFAULT_RSYNC_BINARY.to_owned()
}

fn log_filter_default() -> String {
    default_log_filter().to_owned()
}

fn rsync_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    coerce(deserializer, "RSYNC_PORT", "port number", rsync_port_default)
}

fn ssh_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    coerce(deserializer, "SSH_PORT", "port number", ssh_port_default)
}

fn rsync<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    coerce(deserializer, "RSYNC", "executable name", rsync_default)
}

fn log_filter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    coerce(deserializer, "LOG_FILTER", "filter", log_filter_default)
}

fn log_format<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LogFormat, D::Error> {
    coerce(
        deserializer,
        "LOG_FORMAT",
        "log format (json or compact)",
        default_log_format,
    )
}

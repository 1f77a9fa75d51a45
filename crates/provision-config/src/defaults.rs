//! Built-in values used when no layer overrides a constant.

use crate::logging::LogFormat;

/// Prefix shared by every environment variable that overrides a constant.
pub const ENV_PREFIX: &str = "PROVISION_";

/// Default TCP port the local rsync daemon listens on.
pub const DEFAULT_RSYNC_PORT: u16 = 2873;

/// Default name of the rsync executable, resolved through `PATH`.
pub const DEFAULT_RSYNC_BINARY: &str = "rsync";

/// Default SSH port of the remote peer.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Filter directive applied when neither a flag nor `PROVISION_LOG_FILTER`
/// names one.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Accessor for [`DEFAULT_LOG_FILTER`], usable as a serde default.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

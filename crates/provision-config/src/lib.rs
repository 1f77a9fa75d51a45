//! Shared configuration for the provisioning toolchain.
//!
//! The crate exposes [`Constants`], an immutable registry of process-wide
//! defaults (the rsync port and binary, the SSH port, and the logging
//! preferences). It is loaded once when a binary starts through the
//! `ortho_config` layers (flags, `PROVISION_*` environment variables, an
//! optional `.provision.toml`, built-in defaults) and then handed to the
//! components that need it. Nothing in the workspace mutates it afterwards.

mod constants;
mod defaults;
mod logging;

pub use constants::Constants;
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_RSYNC_BINARY, DEFAULT_RSYNC_PORT, DEFAULT_SSH_PORT, ENV_PREFIX,
    default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError, LogSettings};
pub use ortho_config::OrthoError;

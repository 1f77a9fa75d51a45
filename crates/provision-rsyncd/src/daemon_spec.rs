//! Validated description of the daemon to launch.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the read-only module every generated configuration exposes.
pub const LOCAL_MODULE: &str = "local";

/// Errors raised while validating a [`DaemonSpec`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    /// The root directory was empty.
    #[error("root directory must not be empty")]
    EmptyRoot,
    /// The root directory cannot be written into the configuration verbatim.
    #[error("root directory '{root}' is not usable: {reason}")]
    InvalidRoot {
        /// Offending root, rendered lossily.
        root: String,
        /// Why the root was rejected.
        reason: &'static str,
    },
    /// Port zero asks the OS for an ephemeral port, which nobody could reach.
    #[error("listen port must be non-zero")]
    InvalidPort,
    /// A module name was empty or only whitespace.
    #[error("module names must not be empty")]
    EmptyModuleName,
    /// A module name collides with the built-in read-only module.
    #[error("module name '{name}' is reserved")]
    ReservedModuleName {
        /// Reserved name supplied by the caller.
        name: String,
    },
    /// A module name contains characters the configuration cannot carry.
    #[error("module name '{name}' is invalid: {reason}")]
    InvalidModuleName {
        /// Offending name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },
    /// The same module name was supplied twice.
    #[error("module '{name}' is listed more than once")]
    DuplicateModule {
        /// Repeated name.
        name: String,
    },
}

/// Name of a read-write module exposed by the daemon.
///
/// Module names become both a section header and a path component in the
/// generated configuration, so anything that could escape either is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleName(String);

impl ModuleName {
    /// Validates a module name.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when the name is empty, reserved, or contains path
    /// separators, `..`, brackets, `=` or control characters.
    pub fn new(raw: impl Into<String>) -> Result<Self, SpecError> {
        let name = raw.into();
        if name.trim().is_empty() {
            return Err(SpecError::EmptyModuleName);
        }
        if name == LOCAL_MODULE {
            return Err(SpecError::ReservedModuleName { name });
        }
        if let Some(reason) = module_name_violation(&name) {
            return Err(SpecError::InvalidModuleName { name, reason });
        }
        Ok(Self(name))
    }

    /// Returns the name as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn module_name_violation(name: &str) -> Option<&'static str> {
    if name.contains(['/', '\\']) {
        return Some("path separators are not allowed");
    }
    if name.contains("..") {
        return Some("'..' is not allowed");
    }
    if name.contains(['[', ']']) {
        return Some("brackets are not allowed");
    }
    if name.contains('=') {
        return Some("'=' is not allowed");
    }
    if name.chars().any(char::is_control) {
        return Some("control characters are not allowed");
    }
    if name.trim() != name {
        return Some("leading or trailing whitespace is not allowed");
    }
    None
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Root directory, listen port and read-write modules of one daemon instance.
///
/// Immutable once built; the supervisor keeps it for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSpec {
    root: PathBuf,
    port: u16,
    modules: Vec<ModuleName>,
}

impl DaemonSpec {
    /// Validates and builds a specification. Module order is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] for an empty or non-UTF-8 root, a zero port, an
    /// invalid module name, or a duplicate module.
    pub fn new<I, S>(
        directory: impl Into<PathBuf>,
        port: u16,
        modules: I,
    ) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let root = directory.into();
        validate_root(&root)?;
        if port == 0 {
            return Err(SpecError::InvalidPort);
        }
        let mut validated: Vec<ModuleName> = Vec::new();
        for name in modules {
            let module = ModuleName::new(name)?;
            if validated.contains(&module) {
                return Err(SpecError::DuplicateModule { name: module.0 });
            }
            validated.push(module);
        }
        Ok(Self {
            root,
            port,
            modules: validated,
        })
    }

    /// Directory served read-only as the `local` module.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loopback port the daemon binds.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Read-write modules in the order they were supplied.
    #[must_use]
    pub fn modules(&self) -> &[ModuleName] {
        &self.modules
    }

    /// Directory backing a read-write module.
    #[must_use]
    pub fn module_path(&self, module: &ModuleName) -> PathBuf {
        self.root.join(module.as_str())
    }
}

fn validate_root(root: &Path) -> Result<(), SpecError> {
    let Some(text) = root.to_str() else {
        return Err(SpecError::InvalidRoot {
            root: root.to_string_lossy().into_owned(),
            reason: "path is not valid UTF-8",
        });
    };
    if text.is_empty() {
        return Err(SpecError::EmptyRoot);
    }
    if text.chars().any(char::is_control) {
        return Err(SpecError::InvalidRoot {
            root: text.to_owned(),
            reason: "control characters are not allowed",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn modules_keep_insertion_order() {
        let spec = DaemonSpec::new("/srv/sync", 2873, ["result", "log", "cache"]).expect("valid");
        let names: Vec<&str> = spec.modules().iter().map(ModuleName::as_str).collect();
        assert_eq!(names, ["result", "log", "cache"]);
    }

    #[test]
    fn spec_without_modules_is_valid() {
        let spec = DaemonSpec::new("/srv/sync", 2873, Vec::<String>::new()).expect("valid");
        assert!(spec.modules().is_empty());
        assert_eq!(spec.port(), 2873);
    }

    #[rstest]
    #[case::empty("", SpecError::EmptyModuleName)]
    #[case::blank("   ", SpecError::EmptyModuleName)]
    #[case::reserved("local", SpecError::ReservedModuleName { name: "local".into() })]
    fn rejects_unusable_names(#[case] name: &str, #[case] expected: SpecError) {
        assert_eq!(ModuleName::new(name), Err(expected));
    }

    #[rstest]
    #[case::slash("a/b")]
    #[case::backslash("a\\b")]
    #[case::parent("..")]
    #[case::embedded_parent("a..b")]
    #[case::open_bracket("a[b")]
    #[case::close_bracket("log]")]
    #[case::equals("path=x")]
    #[case::newline("log\n[evil]")]
    #[case::padded(" log")]
    fn rejects_names_that_escape_the_config(#[case] name: &str) {
        assert!(matches!(
            ModuleName::new(name),
            Err(SpecError::InvalidModuleName { .. })
        ));
    }

    #[test]
    fn duplicates_are_rejected() {
        let error = DaemonSpec::new("/srv", 2873, ["log", "result", "log"]).expect_err("dup");
        assert_eq!(
            error,
            SpecError::DuplicateModule {
                name: "log".into()
            }
        );
    }

    #[test]
    fn zero_port_is_rejected() {
        let error = DaemonSpec::new("/srv", 0, ["log"]).expect_err("port zero");
        assert_eq!(error, SpecError::InvalidPort);
    }

    #[rstest]
    #[case::empty("", SpecError::EmptyRoot)]
    #[case::newline("/srv\n[x]", SpecError::InvalidRoot { root: "/srv\n[x]".into(), reason: "control characters are not allowed" })]
    fn rejects_bad_roots(#[case] root: &str, #[case] expected: SpecError) {
        assert_eq!(DaemonSpec::new(root, 2873, ["log"]), Err(expected));
    }

    #[test]
    fn module_path_joins_root_and_name() {
        let spec = DaemonSpec::new("/tmp/rsync", 2222, ["log"]).expect("valid");
        let module = &spec.modules()[0];
        assert_eq!(spec.module_path(module), PathBuf::from("/tmp/rsync/log"));
    }
}

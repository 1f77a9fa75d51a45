//! rsyncd configuration text and its backing temporary file.

use std::io::{self, Write};
use std::path::Path;

use tempfile::{Builder, TempPath};

use crate::daemon_spec::{DaemonSpec, LOCAL_MODULE, ModuleName};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const CONFIG_PREFIX: &str = "rsyncd-";
const CONFIG_SUFFIX: &str = ".conf";

/// Renders the configuration for a validated specification.
#[must_use]
pub fn render_config(spec: &DaemonSpec) -> String {
    generate_config(spec.root(), spec.modules())
}

/// Builds rsyncd configuration text for a root directory and its modules.
///
/// The output disables chroot, exposes `root` read-only as `local`, and adds
/// one read-write module per name rooted at `<root>/<name>`. Pure and
/// deterministic.
#[must_use]
pub fn generate_config(root: &Path, modules: &[ModuleName]) -> String {
    let shown = root.display();
    let mut config = String::from("use chroot = no\n");
    config.push_str(&format!(
        "[{LOCAL_MODULE}]\n    path = {shown}\n    read only = true\n"
    ));
    for module in modules {
        config.push_str(&format!(
            "[{module}]\n    path = {shown}/{module}\n    read only = false\n"
        ));
    }
    config
}

/// Temporary file holding the generated configuration.
///
/// The file is created with owner-only permissions and removed either by
/// [`ConfigFile::remove`] or, as a fallback, when the value is dropped.
#[derive(Debug)]
pub struct ConfigFile {
    path: TempPath,
}

impl ConfigFile {
    /// Writes `contents` to a fresh `rsyncd-*.conf` file in the temp directory.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be created or
    /// written.
    pub fn write(contents: &str) -> io::Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(CONFIG_PREFIX).suffix(CONFIG_SUFFIX);
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            builder.permissions(Permissions::from_mode(0o600));
        }
        let mut file = builder.tempfile()?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    /// Location of the file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file. A file that is already gone counts as removed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported when an existing file cannot be deleted.
    pub fn remove(self) -> io::Result<()> {
        match self.path.close() {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error),
        }
    }
}

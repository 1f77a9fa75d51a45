//! Command lines for the `ssh` and `scp` clients.
//!
//! Everything here is pure: it turns session settings into an [`Invocation`]
//! that the session runs.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use provision_config::DEFAULT_SSH_PORT;

/// Address every forward binds to on the side that receives the traffic.
const LOOPBACK: &str = "127.0.0.1";
const PASSWORD_VARIABLE: &str = "SSHPASS";
const PASSWORD_HELPER: &str = "sshpass";

pub(super) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// A TCP forward carried by the control master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    /// Connections to `remote_port` on the peer reach `local_port` here.
    Remote {
        /// Port opened on the remote host.
        remote_port: u16,
        /// Local port the traffic is delivered to.
        local_port: u16,
    },
    /// Connections to `local_port` here reach `remote_port` on the peer.
    Local {
        /// Port opened on this host.
        local_port: u16,
        /// Remote port the traffic is delivered to.
        remote_port: u16,
    },
}

impl Forward {
    fn arguments(self) -> [String; 2] {
        match self {
            Self::Remote {
                remote_port,
                local_port,
            } => ["-R".to_owned(), format!("{remote_port}:{LOOPBACK}:{local_port}")],
            Self::Local {
                local_port,
                remote_port,
            } => ["-L".to_owned(), format!("{local_port}:{LOOPBACK}:{remote_port}")],
        }
    }
}

#[derive(Clone, Default)]
pub(super) enum Auth {
    #[default]
    Agent,
    KeyFile(PathBuf),
    Password(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => f.write_str("Agent"),
            Self::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// Connection parameters gathered by the session builder.
#[derive(Debug, Clone)]
pub(super) struct Settings {
    pub(super) host: String,
    pub(super) user: Option<String>,
    pub(super) port: u16,
    pub(super) auth: Auth,
    pub(super) forwards: Vec<Forward>,
    pub(super) ssh: OsString,
    pub(super) scp: OsString,
    pub(super) connect_timeout: Duration,
}

impl Settings {
    pub(super) fn new(host: String) -> Self {
        Self {
            host,
            user: None,
            port: DEFAULT_SSH_PORT,
            auth: Auth::default(),
            forwards: Vec::new(),
            ssh: OsString::from("ssh"),
            scp: OsString::from("scp"),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// `user@host`, or the bare host when no user was given.
    pub(super) fn destination(&self) -> String {
        self.user
            .as_ref()
            .map_or_else(|| self.host.clone(), |user| format!("{user}@{}", self.host))
    }

    fn remote_path(&self, path: &str) -> String {
        format!("{}:{path}", self.destination())
    }
}

/// Control commands understood by a running master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ControlOp {
    Check,
    Exit,
}

impl ControlOp {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Exit => "exit",
        }
    }
}

/// A fully resolved client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Invocation {
    pub(super) program: OsString,
    pub(super) args: Vec<OsString>,
    pub(super) password: Option<String>,
}

impl Invocation {
    fn new(program: &OsStr) -> Self {
        Self {
            program: program.to_os_string(),
            args: Vec::new(),
            password: None,
        }
    }

    fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    /// Builds the process command. The password only travels through the
    /// helper's environment.
    pub(super) fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(password) = &self.password {
            command.env(PASSWORD_VARIABLE, password);
        }
        command
    }
}

/// The long-lived `ssh -M -N` process that owns the connection and forwards.
pub(super) fn master(settings: &Settings, socket: &Path) -> Invocation {
    let mut invocation = match &settings.auth {
        Auth::Password(password) => {
            let mut helper = Invocation::new(OsStr::new(PASSWORD_HELPER))
                .arg("-e")
                .arg(&settings.ssh);
            helper.password = Some(password.clone());
            helper
        }
        Auth::Agent | Auth::KeyFile(_) => Invocation::new(&settings.ssh),
    };
    invocation = invocation
        .args(["-M", "-N", "-S"])
        .arg(socket)
        .args([
            "-o",
            "ControlPersist=no",
            "-o",
            "ExitOnForwardFailure=yes",
            "-o",
            "StrictHostKeyChecking=accept-new",
            "-p",
        ])
        .arg(settings.port.to_string());
    invocation = match &settings.auth {
        Auth::Agent => invocation,
        Auth::KeyFile(key) => invocation.arg("-i").arg(key).args([
            "-o",
            "IdentitiesOnly=yes",
            "-o",
            "BatchMode=yes",
        ]),
        Auth::Password(_) => invocation.args([
            "-o",
            "PreferredAuthentications=password,keyboard-interactive",
        ]),
    };
    for forward in &settings.forwards {
        invocation = invocation.args(forward.arguments());
    }
    invocation.arg(settings.destination())
}

/// Asks the master behind `socket` to report on or end the connection.
pub(super) fn control(settings: &Settings, socket: &Path, op: ControlOp) -> Invocation {
    Invocation::new(&settings.ssh)
        .arg("-S")
        .arg(socket)
        .args(["-O", op.as_str()])
        .arg(settings.destination())
}

/// Recursive upload of `local` to `remote` on the peer.
pub(super) fn push(settings: &Settings, socket: &Path, local: &Path, remote: &str) -> Invocation {
    copy(settings, socket)
        .arg(local)
        .arg(settings.remote_path(remote))
}

/// Recursive download of `remote` on the peer to `local`.
pub(super) fn pull(settings: &Settings, socket: &Path, remote: &str, local: &Path) -> Invocation {
    copy(settings, socket)
        .arg(settings.remote_path(remote))
        .arg(local)
}

fn copy(settings: &Settings, socket: &Path) -> Invocation {
    let mut control_path = OsString::from("ControlPath=");
    control_path.push(socket);
    Invocation::new(&settings.scp)
        .args(["-r", "-q", "-o"])
        .arg(control_path)
        .arg("-P")
        .arg(settings.port.to_string())
}

/// Runs `script` on the peer over the existing connection.
pub(super) fn execute(settings: &Settings, socket: &Path, script: &str) -> Invocation {
    Invocation::new(&settings.ssh)
        .arg("-S")
        .arg(socket)
        .arg("-p")
        .arg(settings.port.to_string())
        .arg(settings.destination())
        .arg(script)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    const SOCKET: &str = "/tmp/provision-ssh/control";

    #[fixture]
    fn settings() -> Settings {
        let mut settings = Settings::new("builder.example.org".to_owned());
        settings.user = Some("ci".to_owned());
        settings.port = 2222;
        settings
    }

    fn strings(invocation: &Invocation) -> Vec<String> {
        invocation
            .args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[rstest]
    fn master_with_key_carries_forwards_in_order(mut settings: Settings) {
        settings.auth = Auth::KeyFile(PathBuf::from("/keys/id_ed25519"));
        settings.forwards = vec![
            Forward::Remote {
                remote_port: 2873,
                local_port: 8730,
            },
            Forward::Local {
                local_port: 5433,
                remote_port: 5432,
            },
        ];
        let invocation = master(&settings, Path::new(SOCKET));
        assert_eq!(invocation.program, OsString::from("ssh"));
        assert_eq!(invocation.password, None);
        assert_eq!(
            strings(&invocation),
            [
                "-M",
                "-N",
                "-S",
                SOCKET,
                "-o",
                "ControlPersist=no",
                "-o",
                "ExitOnForwardFailure=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "-o",
                "IdentitiesOnly=yes",
                "-o",
                "BatchMode=yes",
                "-R",
                "2873:127.0.0.1:8730",
                "-L",
                "5433:127.0.0.1:5432",
                "ci@builder.example.org",
            ]
        );
    }

    #[rstest]
    fn password_runs_through_the_helper(mut settings: Settings) {
        settings.auth = Auth::Password("hunter2".to_owned());
        let invocation = master(&settings, Path::new(SOCKET));
        assert_eq!(invocation.program, OsString::from("sshpass"));
        assert_eq!(invocation.password.as_deref(), Some("hunter2"));
        let args = strings(&invocation);
        assert_eq!(args.first().map(String::as_str), Some("-e"));
        assert_eq!(args.get(1).map(String::as_str), Some("ssh"));
        assert!(!args.iter().any(|arg| arg.contains("hunter2")));
    }

    #[rstest]
    fn password_is_redacted_from_debug_output() {
        let rendered = format!("{:?}", Auth::Password("hunter2".to_owned()));
        assert!(!rendered.contains("hunter2"));
    }

    #[rstest]
    #[case::check(ControlOp::Check, "check")]
    #[case::exit(ControlOp::Exit, "exit")]
    fn control_commands_target_the_socket(
        settings: Settings,
        #[case] op: ControlOp,
        #[case] name: &str,
    ) {
        let invocation = control(&settings, Path::new(SOCKET), op);
        assert_eq!(
            strings(&invocation),
            ["-S", SOCKET, "-O", name, "ci@builder.example.org"]
        );
    }

    #[rstest]
    fn push_and_pull_mirror_each_other(settings: Settings) {
        let socket = Path::new(SOCKET);
        let pushed = push(&settings, socket, Path::new("inputs"), "/tmp/inputs");
        let pulled = pull(&settings, socket, "/tmp/outputs", Path::new("outputs"));
        let common = [
            "-r",
            "-q",
            "-o",
            "ControlPath=/tmp/provision-ssh/control",
            "-P",
            "2222",
        ];
        assert_eq!(pushed.program, OsString::from("scp"));
        assert_eq!(
            strings(&pushed),
            [&common[..], &["inputs", "ci@builder.example.org:/tmp/inputs"][..]].concat()
        );
        assert_eq!(
            strings(&pulled),
            [&common[..], &["ci@builder.example.org:/tmp/outputs", "outputs"][..]].concat()
        );
    }

    #[rstest]
    fn execute_reuses_the_connection(mut settings: Settings) {
        settings.user = None;
        let invocation = execute(&settings, Path::new(SOCKET), "/tmp/run.sh");
        assert_eq!(
            strings(&invocation),
            ["-S", SOCKET, "-p", "2222", "builder.example.org", "/tmp/run.sh"]
        );
    }
}

//! Process launcher: spawns a shell command with three independent pipes.

use std::{path::Path, process::Stdio, sync::Arc};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};

use crate::{
    ExecError,
    shell::{HostShell, SearchPath},
};

/// Parent environment variables a child is allowed to see.
const INHERITED_VARS: &[&str] = &[
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TZ",
    "TMPDIR",
    // Windows
    "USERPROFILE",
    "USERNAME",
    "SYSTEMROOT",
    "SYSTEMDRIVE",
    "WINDIR",
    "COMSPEC",
    "PATHEXT",
    "APPDATA",
    "LOCALAPPDATA",
    "PROGRAMDATA",
    "PROGRAMFILES",
    "TEMP",
    "TMP",
];

/// A freshly spawned command.
pub struct LaunchedProcess {
    /// Process group led by the shell.
    pub child: AsyncGroupChild,
    pub stdin: Option<ChildStdin>,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawns command lines through the host shell.
#[derive(Debug, Clone)]
pub struct Launcher {
    shell: HostShell,
    search: Arc<SearchPath>,
}

impl Launcher {
    #[must_use]
    pub const fn new(shell: HostShell, search: Arc<SearchPath>) -> Self {
        Self { shell, search }
    }

    /// Launcher using the host's shell.
    #[must_use]
    pub fn detect(search: Arc<SearchPath>) -> Self {
        Self::new(HostShell::detect(), search)
    }

    #[must_use]
    pub const fn shell(&self) -> &HostShell {
        &self.shell
    }

    /// Build the command without spawning it.
    #[must_use]
    pub fn command(&self, line: &str, cwd: &Path) -> Command {
        let mut cmd = Command::new(self.shell.program());
        cmd.args(self.shell.args(line))
            .current_dir(cwd)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for key in INHERITED_VARS {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }
        cmd.env("PATH", self.search.to_path_var())
            .env("TERM", "dumb")
            .env("PYTHONUNBUFFERED", "1");
        cmd
    }

    /// Spawn `line` in `cwd` as the leader of a new process group.
    ///
    /// # Errors
    /// Returns error if `cwd` is not a directory or the shell cannot start.
    pub fn spawn(&self, line: &str, cwd: &Path) -> Result<LaunchedProcess, ExecError> {
        if !cwd.is_dir() {
            return Err(ExecError::InvalidCwd(cwd.to_path_buf()));
        }

        let mut child = self
            .command(line, cwd)
            .group_spawn()
            .map_err(|source| ExecError::SpawnFailed {
                command: line.to_string(),
                source,
            })?;

        let inner = child.inner();
        let stdin = inner.stdin.take();
        let pipes = inner.stdout.take().zip(inner.stderr.take());
        let Some((stdout, stderr)) = pipes else {
            let _ = child.start_kill();
            return Err(ExecError::MissingPipe("output"));
        };

        tracing::debug!(pid = ?child.id(), cwd = %cwd.display(), "Spawned command");
        Ok(LaunchedProcess {
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

//! Host shell selection and executable search path discovery.

use std::{
    collections::HashSet,
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    time::Duration,
};

/// Time allowed for a login shell to report its `PATH`.
const LOGIN_PATH_TIMEOUT: Duration = Duration::from_secs(5);

/// PowerShell definitions of the POSIX-style helpers users reach for.
const POWERSHELL_SHIMS: &str = r#"
function touch { foreach ($p in $args) { if (Test-Path $p) { (Get-Item $p).LastWriteTime = Get-Date } else { New-Item -ItemType File -Path $p | Out-Null } } }
function which { param($name) Get-Command $name -ErrorAction SilentlyContinue | Select-Object -ExpandProperty Source }
function head { param([int]$n = 10, $path) if ($path) { Get-Content $path -TotalCount $n } else { $input | Select-Object -First $n } }
function tail { param([int]$n = 10, $path) if ($path) { Get-Content $path -Tail $n } else { $input | Select-Object -Last $n } }
function grep { param($pattern, $path) if ($path) { Select-String -Pattern $pattern -Path $path } else { $input | Select-String -Pattern $pattern } }
function export { foreach ($kv in $args) { $k, $v = $kv -split '=', 2; Set-Item -Path "Env:$k" -Value $v } }
"#;

/// Unix shell types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnixShell {
    Zsh(PathBuf),
    Bash(PathBuf),
    Sh(PathBuf),
    Other(PathBuf),
}

impl UnixShell {
    /// Get the shell path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Zsh(p) | Self::Bash(p) | Self::Sh(p) | Self::Other(p) => p,
        }
    }

    /// Whether this shell supports login mode.
    #[must_use]
    pub const fn login(&self) -> bool {
        matches!(self, Self::Zsh(_) | Self::Bash(_))
    }

    /// Interactive rc file that usually carries toolchain PATH edits.
    #[must_use]
    pub fn rc_file(&self) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let rc = match self {
            Self::Zsh(_) => home.join(".zshrc"),
            Self::Bash(_) => home.join(".bashrc"),
            Self::Sh(_) | Self::Other(_) => return None,
        };
        rc.is_file().then_some(rc)
    }

    /// The shell named by `$SHELL`, falling back to `/bin/sh`.
    #[must_use]
    pub fn current_shell() -> Self {
        std::env::var("SHELL")
            .ok()
            .and_then(|shell| Self::from_path(Path::new(&shell)))
            .unwrap_or_else(|| Self::Sh(PathBuf::from("/bin/sh")))
    }

    /// Create from a path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        if !(path.is_absolute() && path.is_file()) {
            return None;
        }
        let path_buf = path.to_path_buf();
        Some(match path.file_name().and_then(OsStr::to_str) {
            Some("zsh") => Self::Zsh(path_buf),
            Some("bash") => Self::Bash(path_buf),
            Some("sh") => Self::Sh(path_buf),
            _ => Self::Other(path_buf),
        })
    }
}

/// The shell a command line is handed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostShell {
    /// POSIX shell invoked with `-c`.
    Posix(UnixShell),
    /// PowerShell with the POSIX shims prepended.
    PowerShell(PathBuf),
}

impl HostShell {
    /// Pick the shell for the current platform.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            let program = which::which("pwsh.exe")
                .or_else(|_| which::which("powershell.exe"))
                .unwrap_or_else(|_| PathBuf::from("powershell.exe"));
            Self::PowerShell(program)
        } else {
            Self::Posix(UnixShell::current_shell())
        }
    }

    /// Shell program to execute.
    #[must_use]
    pub fn program(&self) -> &Path {
        match self {
            Self::Posix(shell) => shell.path(),
            Self::PowerShell(program) => program,
        }
    }

    /// Arguments that make the shell run `command_line` and exit.
    #[must_use]
    pub fn args(&self, command_line: &str) -> Vec<String> {
        match self {
            Self::Posix(_) => vec!["-c".to_string(), command_line.to_string()],
            Self::PowerShell(_) => vec![
                "-NoLogo".to_string(),
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-Command".to_string(),
                format!("{POWERSHELL_SHIMS}\n{command_line}\nif ($LASTEXITCODE) {{ exit $LASTEXITCODE }}"),
            ],
        }
    }
}

/// Merge two PATH strings into a single, de-duplicated PATH.
#[must_use]
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let mut merged = Vec::<PathBuf>::new();

    for p in split_paths(primary.as_ref()).chain(split_paths(secondary.as_ref())) {
        if !p.as_os_str().is_empty() && seen.insert(p.clone()) {
            merged.push(p);
        }
    }

    join_paths(merged).unwrap_or_default()
}

/// Directories where locally installed toolchains commonly live.
fn toolchain_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        for rel in [".cargo/bin", ".local/bin", "go/bin", ".bun/bin", ".deno/bin"] {
            candidates.push(home.join(rel));
        }
    }
    if cfg!(windows) {
        for dir in [
            r"C:\xampp\php",
            r"C:\xampp\mysql\bin",
            r"C:\Program Files\nodejs",
            r"C:\Program Files\Git\cmd",
        ] {
            candidates.push(PathBuf::from(dir));
        }
        if let Some(appdata) = dirs::data_dir() {
            candidates.push(appdata.join("npm"));
        }
    } else {
        for dir in ["/usr/local/bin", "/opt/homebrew/bin", "/usr/local/go/bin"] {
            candidates.push(PathBuf::from(dir));
        }
    }
    candidates
}

/// Executable search path handed to every child process.
///
/// Built from the server's own `PATH`, the `PATH` a login shell reports and
/// any toolchain directories that actually exist on this host.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    base: OsString,
    augmentations: Vec<PathBuf>,
}

impl SearchPath {
    /// Search path from explicit parts; nothing is probed.
    #[must_use]
    pub fn from_parts(base: impl Into<OsString>, augmentations: Vec<PathBuf>) -> Self {
        Self {
            base: base.into(),
            augmentations,
        }
    }

    /// Probe the host for toolchain directories.
    ///
    /// `extra` directories come from configuration and are subject to the
    /// same existence check as the built-in candidates.
    pub async fn discover(extra: &[PathBuf]) -> Self {
        let mut base = std::env::var_os("PATH").unwrap_or_default();
        if let Some(login) = login_shell_path().await {
            base = merge_paths(&base, login);
        }

        let augmentations: Vec<PathBuf> = extra
            .iter()
            .cloned()
            .chain(toolchain_candidates())
            .filter(|dir| dir.is_dir())
            .collect();
        tracing::debug!(?augmentations, "Discovered toolchain directories");

        Self {
            base,
            augmentations,
        }
    }

    /// Directories added on top of the inherited `PATH`.
    #[must_use]
    pub fn augmentations(&self) -> &[PathBuf] {
        &self.augmentations
    }

    /// The `PATH` value for child processes.
    #[must_use]
    pub fn to_path_var(&self) -> OsString {
        let extra = join_paths(&self.augmentations).unwrap_or_default();
        merge_paths(&self.base, extra)
    }

    /// Resolve an executable by name against this search path.
    ///
    /// Names containing a separator are resolved relative to `cwd`.
    pub async fn resolve(&self, executable: &str, cwd: &Path) -> Option<PathBuf> {
        if executable.trim().is_empty() {
            return None;
        }
        let executable = executable.to_string();
        let path_var = self.to_path_var();
        let cwd = cwd.to_path_buf();
        tokio::task::spawn_blocking(move || which::which_in(executable, Some(path_var), cwd))
            .await
            .ok()
            .and_then(Result::ok)
    }
}

/// Ask the user's login shell for its `PATH`.
#[cfg(not(windows))]
async fn login_shell_path() -> Option<OsString> {
    use std::process::Stdio;

    use tokio::process::Command;

    let shell = UnixShell::current_shell();
    let mut cmd = Command::new(shell.path());
    if shell.login() {
        cmd.arg("-l");
    }
    let script = match shell.rc_file().and_then(|rc| {
        shlex::try_quote(rc.to_string_lossy().as_ref())
            .ok()
            .map(|q| q.into_owned())
    }) {
        Some(rc) => format!(". {rc} >/dev/null 2>&1; printf '%s' \"$PATH\""),
        None => "printf '%s' \"$PATH\"".to_string(),
    };
    cmd.arg("-c")
        .arg(script)
        .env("TERM", "dumb")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = cmd.spawn().ok()?;
    let output = match tokio::time::timeout(LOGIN_PATH_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            tracing::debug!(shell = %shell.path().display(), ?err, "Login shell PATH probe failed");
            return None;
        }
        Err(_) => {
            tracing::warn!(shell = %shell.path().display(), "Timed out retrieving PATH from login shell");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!path.is_empty()).then(|| OsString::from(path))
}

#[cfg(windows)]
async fn login_shell_path() -> Option<OsString> {
    let _ = LOGIN_PATH_TIMEOUT;
    None
}

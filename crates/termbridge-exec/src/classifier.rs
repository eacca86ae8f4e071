//! Command classification: built-ins, blocked programs and dispatchable lines.

use std::{path::Path, sync::Arc};

use crate::shell::SearchPath;

/// Programs that only work on a real terminal, with the hint shown instead.
const INTERACTIVE_PROGRAMS: &[(&str, &str)] = &[
    ("nano", "Please use the file editor for editing files."),
    ("vi", "Please use the file editor for editing files."),
    ("vim", "Please use the file editor for editing files."),
    ("nvim", "Please use the file editor for editing files."),
    ("emacs", "Please use the file editor for editing files."),
    ("pico", "Please use the file editor for editing files."),
    ("less", "Use 'cat', 'head' or 'tail' to view files."),
    ("more", "Use 'cat', 'head' or 'tail' to view files."),
    ("man", "Use '<command> --help' instead."),
    ("top", "Use 'ps' for a snapshot of running processes."),
    ("htop", "Use 'ps' for a snapshot of running processes."),
    ("btop", "Use 'ps' for a snapshot of running processes."),
    ("watch", "Run the command directly instead."),
    ("ssh", "Remote shells need a real terminal."),
    ("telnet", "Remote shells need a real terminal."),
    ("sftp", "Remote shells need a real terminal."),
    ("tmux", "Terminal multiplexers need a real terminal."),
    ("screen", "Terminal multiplexers need a real terminal."),
];

/// Interpreters and shells that open a REPL when given no arguments.
const REPL_PROGRAMS: &[&str] = &[
    "python", "python3", "node", "php", "irb", "ruby", "lua", "ghci", "deno", "bun", "sqlite3",
    "mysql", "psql", "sh", "bash", "zsh", "fish", "pwsh", "powershell", "cmd",
];

/// Shell built-ins and keywords; these never resolve to a file on disk.
const POSIX_BUILTINS: &[&str] = &[
    "cd", "echo", "printf", "pwd", "export", "unset", "set", "true", "false", "test", "[", "type",
    "command", "alias", "unalias", "source", ".", "exit", "eval", "exec", "read", "wait", "kill",
    "ulimit", "umask", "trap", "shift", "let", "declare", "local", "readonly", "times", "hash",
    "if", "for", "while", "until", "case", "function", "time", "!", "{", "(",
];

/// PowerShell built-ins, aliases and the shimmed POSIX helpers.
const POWERSHELL_BUILTINS: &[&str] = &[
    "cd", "echo", "pwd", "ls", "dir", "cat", "type", "cp", "copy", "mv", "move", "rm", "del",
    "mkdir", "rmdir", "cls", "clear", "set", "exit", "touch", "which", "head", "tail", "grep", "export",
    "if", "foreach", "for", "while", "function", "&", "(", "{",
];

/// Characters that make a line a compound shell construct.
const SHELL_OPERATORS: &[char] = &[';', '|', '&', '<', '>', '`', '\n'];

/// Shell dialect the classifier reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    /// Dialect of the host the server runs on.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }
}

/// Built-in commands handled without spawning a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    /// `cd [target]`.
    Cd { target: Option<String> },
}

/// Why a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Full-screen or terminal-bound program.
    Interactive,
    /// Interpreter or shell started without a script.
    Repl,
    /// The executable could not be found.
    NotFound,
}

/// A refused command and the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked {
    pub kind: BlockKind,
    pub program: String,
    pub message: String,
}

impl Blocked {
    /// Exit status reported for the refusal.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self.kind {
            BlockKind::Interactive | BlockKind::Repl => 1,
            BlockKind::NotFound => 127,
        }
    }
}

/// A command line cleared for launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatchable {
    /// Trimmed command line handed to the shell.
    pub line: String,
    /// Leading executable name.
    pub program: String,
}

/// Classifier verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Nothing to run.
    Empty,
    Builtin(Builtin),
    Blocked(Blocked),
    Dispatchable(Dispatchable),
}

/// Policy deciding what happens to a command line.
#[derive(Debug, Clone)]
pub struct Classifier {
    search: Arc<SearchPath>,
    platform: Platform,
}

impl Classifier {
    /// Classifier for the host platform.
    #[must_use]
    pub fn new(search: Arc<SearchPath>) -> Self {
        Self::for_platform(search, Platform::host())
    }

    #[must_use]
    pub const fn for_platform(search: Arc<SearchPath>, platform: Platform) -> Self {
        Self { search, platform }
    }

    /// Classify without touching the filesystem.
    ///
    /// Lines that pass the policy come back as `Dispatchable`; the existence
    /// probe happens in [`Classifier::classify`].
    #[must_use]
    pub fn policy(&self, raw: &str) -> Classification {
        let line = raw.trim();
        if line.is_empty() {
            return Classification::Empty;
        }

        let tokens = split_command_line(line);
        let words: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .skip_while(|t| self.platform == Platform::Posix && is_env_assignment(t))
            .collect();
        let Some(&first) = words.first() else {
            return dispatch(line, "");
        };

        if first == "cd" && !line.contains(SHELL_OPERATORS) && !line.contains("$(") {
            let rest = words[1..].join(" ");
            let target = (!rest.is_empty()).then_some(rest);
            return Classification::Builtin(Builtin::Cd { target });
        }

        let name = program_name(first, self.platform);
        if let Some((_, hint)) = INTERACTIVE_PROGRAMS.iter().find(|(p, _)| *p == name) {
            return Classification::Blocked(Blocked {
                kind: BlockKind::Interactive,
                program: name.clone(),
                message: format!(
                    "Error: Interactive command '{name}' is not supported in this web terminal. {hint}\n"
                ),
            });
        }
        if words.len() == 1 && REPL_PROGRAMS.contains(&name.as_str()) {
            return Classification::Blocked(Blocked {
                kind: BlockKind::Repl,
                program: name,
                message: "Error: Interactive shells are not supported. You can run scripts \
                          (e.g., 'python script.py') or one-liners.\n"
                    .to_string(),
            });
        }

        dispatch(line, first)
    }

    /// Full classification, probing for the executable when needed.
    pub async fn classify(&self, raw: &str, cwd: &Path) -> Classification {
        let verdict = self.policy(raw);
        let Classification::Dispatchable(ref cmd) = verdict else {
            return verdict;
        };
        if cmd.program.is_empty() || self.is_builtin(&cmd.program) {
            return verdict;
        }
        if self.search.resolve(&cmd.program, cwd).await.is_some() {
            return verdict;
        }

        tracing::debug!(program = %cmd.program, "Executable not found");
        Classification::Blocked(Blocked {
            kind: BlockKind::NotFound,
            program: cmd.program.clone(),
            message: not_found_message(&cmd.program),
        })
    }

    fn is_builtin(&self, program: &str) -> bool {
        if program.starts_with(['(', '{', '$']) {
            return true;
        }
        match self.platform {
            Platform::Posix => POSIX_BUILTINS.contains(&program),
            Platform::Windows => {
                let lower = program.to_ascii_lowercase();
                // Verb-Noun cmdlets are resolved by PowerShell itself.
                lower.contains('-') || POWERSHELL_BUILTINS.contains(&lower.as_str())
            }
        }
    }
}

fn dispatch(line: &str, program: &str) -> Classification {
    Classification::Dispatchable(Dispatchable {
        line: line.to_string(),
        program: program.to_string(),
    })
}

fn is_env_assignment(token: &str) -> bool {
    token.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit())
    })
}

/// Bare program name used for policy lookups (`/usr/bin/vim` -> `vim`).
fn program_name(token: &str, platform: Platform) -> String {
    let base = token.rsplit(['/', '\\']).next().unwrap_or(token);
    match platform {
        Platform::Posix => base.to_string(),
        Platform::Windows => {
            let lower = base.to_ascii_lowercase();
            lower
                .strip_suffix(".exe")
                .map_or_else(|| lower.clone(), str::to_string)
        }
    }
}

/// Remediation text for a missing executable.
#[must_use]
pub fn not_found_message(program: &str) -> String {
    let name = program_name(program, Platform::host());
    let hint = match name.as_str() {
        "git" => "Git is not installed or not on PATH. Install it from https://git-scm.com/downloads \
                  to use version control from the terminal."
            .to_string(),
        "node" | "npm" | "npx" => "Node.js is not installed or not on PATH. Install it from \
                                   https://nodejs.org (npm and npx ship with it)."
            .to_string(),
        "yarn" | "pnpm" => format!("Install it with 'npm install -g {name}' or enable corepack."),
        "python" | "python3" | "pip" | "pip3" => "Python is not installed or not on PATH. \
                                                  Install it from https://www.python.org/downloads."
            .to_string(),
        "php" => "PHP is not installed or not on PATH. Install it from https://www.php.net/downloads."
            .to_string(),
        "composer" => "Composer is not installed. See https://getcomposer.org/download.".to_string(),
        "cargo" | "rustc" | "rustup" => {
            "The Rust toolchain is not installed. Install it with https://rustup.rs.".to_string()
        }
        "go" => "Go is not installed or not on PATH. Install it from https://go.dev/dl.".to_string(),
        "java" | "javac" | "mvn" | "gradle" => {
            "A Java toolchain is not installed or not on PATH.".to_string()
        }
        "docker" => "Docker is not installed or the daemon CLI is not on PATH.".to_string(),
        _ => return format!("{name}: command not found\n"),
    };
    format!("{name}: command not found. {hint}\n")
}

/// Split a command line into words, falling back to whitespace on bad quoting.
fn split_command_line(input: &str) -> Vec<String> {
    #[cfg(windows)]
    {
        winsplit::split(input)
    }

    #[cfg(not(windows))]
    {
        shlex::split(input)
            .unwrap_or_else(|| input.split_whitespace().map(str::to_string).collect())
    }
}

//! Exec pipeline errors.

use std::path::PathBuf;

use termbridge_core::ExecutionId;
use thiserror::Error;

/// Executor error.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to start '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Working directory is not available: {0}")]
    InvalidCwd(PathBuf),
    #[error("Child process is missing its {0} pipe")]
    MissingPipe(&'static str),
    #[error("Unknown process id: {0}")]
    UnknownProcessId(ExecutionId),
}

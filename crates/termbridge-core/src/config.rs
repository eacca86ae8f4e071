//! Bridge configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happens to a running command when its client goes away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Kill the whole process group.
    #[default]
    Kill,
    /// Let the command run to completion; output is discarded.
    Detach,
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunables shared by the exec pipeline and the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Seconds without output before a heartbeat line is sent.
    pub heartbeat_secs: u64,
    /// Milliseconds to keep draining pipes after the process exits.
    pub drain_window_ms: u64,
    /// Seconds a session may sit idle before it is evicted.
    pub session_ttl_secs: u64,
    /// Seconds between eviction sweeps.
    pub sweep_interval_secs: u64,
    /// Behavior on client disconnect.
    pub on_disconnect: DisconnectPolicy,
    /// Capacity of the per-exec outbound message queue.
    pub stream_capacity: usize,
    /// Starting directory when a request carries no workspace.
    pub default_cwd: Option<PathBuf>,
    /// Extra toolchain directories, added to PATH when they exist.
    pub extra_search_paths: Vec<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 25,
            drain_window_ms: 150,
            session_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
            on_disconnect: DisconnectPolicy::Kill,
            stream_capacity: 256,
            default_cwd: None,
            extra_search_paths: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns error if the document is not valid TOML for this struct.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    #[must_use]
    pub const fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_window_ms)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = BridgeConfig::from_toml_str(
            r#"
            heartbeat_secs = 5
            on_disconnect = "detach"
            extra_search_paths = ["/opt/tools/bin"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.heartbeat(), Duration::from_secs(5));
        assert_eq!(cfg.on_disconnect, DisconnectPolicy::Detach);
        assert_eq!(cfg.extra_search_paths, vec![PathBuf::from("/opt/tools/bin")]);
        assert_eq!(cfg.session_ttl_secs, BridgeConfig::default().session_ttl_secs);
    }

    #[test]
    fn idle_sessions_last_a_day_by_default() {
        let cfg = BridgeConfig::default();
        assert_eq!(Duration::from_secs(cfg.session_ttl_secs), Duration::from_secs(86_400));
        assert!(cfg.sweep_interval() < Duration::from_secs(cfg.session_ttl_secs));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(BridgeConfig::from_toml_str(r#"on_disconnect = "ignore""#).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(&tmp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

//! Session persistence types and the storage trait.

use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session identifier: one terminal session per user.
pub type UserId = String;

/// Persisted terminal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Owner of the session.
    pub user_id: UserId,
    /// Current working directory (absolute, verified when it was set).
    pub cwd: PathBuf,
    /// Workspace root the cwd was derived against, if any.
    pub root: Option<PathBuf>,
    /// Last-touched timestamp (Unix epoch seconds).
    pub last_touched: i64,
}

impl Session {
    /// Create a session starting in `cwd`.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, cwd: PathBuf, root: Option<PathBuf>) -> Self {
        Self {
            user_id: user_id.into(),
            cwd,
            root,
            last_touched: unix_now(),
        }
    }

    /// Refresh the last-touched timestamp.
    pub fn touch(&mut self) {
        self.last_touched = unix_now();
    }
}

/// Current time as Unix epoch seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for session storage backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for a user.
    async fn load(&self, user_id: &str) -> Result<Option<Session>, StoreError>;

    /// Insert or replace a session.
    async fn save(&self, session: Session) -> Result<(), StoreError>;

    /// Drop a session (logout or expiry).
    async fn remove(&self, user_id: &str) -> Result<(), StoreError>;

    /// Users whose session was last touched before `cutoff` (epoch seconds).
    async fn idle_since(&self, cutoff: i64) -> Result<Vec<UserId>, StoreError>;
}

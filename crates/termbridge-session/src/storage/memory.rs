//! In-memory session storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use termbridge_core::{Session, SessionStore, StoreError, UserId};

/// In-memory session store.
///
/// Suitable for single-process deployments; sessions are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, user_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(user_id)
            .cloned())
    }

    async fn save(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(session.user_id.clone(), session);
        Ok(())
    }

    async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        self.sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(user_id);
        Ok(())
    }

    async fn idle_since(&self, cutoff: i64) -> Result<Vec<UserId>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut idle: Vec<UserId> = sessions
            .values()
            .filter(|s| s.last_touched < cutoff)
            .map(|s| s.user_id.clone())
            .collect();
        idle.sort();
        Ok(idle)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[tokio::test]
    async fn save_replaces_and_remove_forgets() {
        let store = MemorySessionStore::new();
        assert!(store.load("7").await.unwrap().is_none());

        store
            .save(Session::new("7", PathBuf::from("/a"), None))
            .await
            .unwrap();
        store
            .save(Session::new("7", PathBuf::from("/b"), None))
            .await
            .unwrap();
        assert_eq!(store.load("7").await.unwrap().unwrap().cwd, PathBuf::from("/b"));

        store.remove("7").await.unwrap();
        assert!(store.load("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn idle_since_uses_last_touched() {
        let store = MemorySessionStore::new();
        let mut stale = Session::new("old", PathBuf::from("/"), None);
        stale.last_touched = 100;
        let mut fresh = Session::new("new", PathBuf::from("/"), None);
        fresh.last_touched = 500;
        store.save(stale).await.unwrap();
        store.save(fresh).await.unwrap();

        assert_eq!(store.idle_since(200).await.unwrap(), vec!["old".to_string()]);
        assert!(store.idle_since(100).await.unwrap().is_empty());
    }
}

//! Registry of live executions keyed by their opaque id.

use std::{collections::HashMap, time::Instant};

use bytes::Bytes;
use termbridge_core::{ExecutionId, UserId};
use tokio::sync::{RwLock, oneshot};

use crate::{
    ExecError,
    relay::{RelayReceiver, RelaySender, relay_channel},
};

/// Bookkeeping for one live execution.
struct Entry {
    owner: UserId,
    started_at: Instant,
    relay: RelaySender,
    interrupt_tx: Option<oneshot::Sender<()>>,
}

/// What the pump needs from a fresh registration.
#[derive(Debug)]
pub struct Registration {
    pub id: ExecutionId,
    pub relay: RelayReceiver,
    pub interrupt_rx: oneshot::Receiver<()>,
}

/// Maps execution ids to their stdin relay and interrupt handle.
///
/// Lookups are scoped to the owning user: another user's id behaves exactly
/// like an id that never existed.
#[derive(Default)]
pub struct ProcessRegistry {
    entries: RwLock<HashMap<ExecutionId, Entry>>,
}

impl ProcessRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and register a new execution.
    pub async fn register(&self, owner: &str, command: &str) -> Registration {
        let (relay_tx, relay_rx) = relay_channel();
        let (interrupt_tx, interrupt_rx) = oneshot::channel();

        let mut entries = self.entries.write().await;
        let mut id = ExecutionId::random();
        while entries.contains_key(&id) {
            id = ExecutionId::random();
        }
        entries.insert(
            id.clone(),
            Entry {
                owner: owner.to_string(),
                started_at: Instant::now(),
                relay: relay_tx,
                interrupt_tx: Some(interrupt_tx),
            },
        );
        drop(entries);

        tracing::debug!(process_id = %id, user = owner, command, "Registered execution");
        Registration {
            id,
            relay: relay_rx,
            interrupt_rx,
        }
    }

    /// Forward stdin to a live execution.
    ///
    /// Empty input is accepted as a no-op for live ids.
    ///
    /// # Errors
    /// Returns `UnknownProcessId` if the id is unknown, finished or owned by
    /// someone else.
    pub async fn send_input(
        &self,
        owner: &str,
        id: &ExecutionId,
        input: Bytes,
    ) -> Result<(), ExecError> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(id)
            .filter(|e| e.owner == owner)
            .ok_or_else(|| ExecError::UnknownProcessId(id.clone()))?;
        if input.is_empty() {
            return Ok(());
        }
        entry
            .relay
            .send(input)
            .map_err(|_| ExecError::UnknownProcessId(id.clone()))
    }

    /// Ask the pump to kill an execution.
    ///
    /// Repeated interrupts of a live execution succeed without effect.
    ///
    /// # Errors
    /// Returns `UnknownProcessId` under the same rules as [`Self::send_input`].
    pub async fn interrupt(&self, owner: &str, id: &ExecutionId) -> Result<(), ExecError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .filter(|e| e.owner == owner)
            .ok_or_else(|| ExecError::UnknownProcessId(id.clone()))?;
        if let Some(tx) = entry.interrupt_tx.take() {
            let _ = tx.send(());
            tracing::info!(process_id = %id, user = owner, "Interrupt requested");
        }
        Ok(())
    }

    /// Forget an execution; its relay is closed with it.
    pub async fn remove(&self, id: &ExecutionId) -> bool {
        let removed = self.entries.write().await.remove(id);
        if let Some(entry) = &removed {
            tracing::debug!(
                process_id = %id,
                elapsed_ms = entry.started_at.elapsed().as_millis(),
                "Removed execution"
            );
        }
        removed.is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayInput;

    #[tokio::test]
    async fn input_reaches_the_relay_in_order() {
        let registry = ProcessRegistry::new();
        let mut reg = registry.register("u1", "cat").await;

        registry
            .send_input("u1", &reg.id, Bytes::from_static(b"one\n"))
            .await
            .unwrap();
        registry
            .send_input("u1", &reg.id, Bytes::from_static(b"two\n"))
            .await
            .unwrap();

        assert_eq!(
            reg.relay.recv_pending().await,
            Some(RelayInput::Data(Bytes::from_static(b"one\ntwo\n")))
        );
    }

    #[tokio::test]
    async fn removed_ids_are_unknown() {
        let registry = ProcessRegistry::new();
        let reg = registry.register("u1", "sleep 1").await;
        assert!(registry.remove(&reg.id).await);
        assert!(!registry.remove(&reg.id).await);

        let err = registry
            .send_input("u1", &reg.id, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::UnknownProcessId(_)));
        assert!(registry.interrupt("u1", &reg.id).await.is_err());
    }

    #[tokio::test]
    async fn other_users_cannot_reach_an_execution() {
        let registry = ProcessRegistry::new();
        let reg = registry.register("u1", "cat").await;

        assert!(
            registry
                .send_input("u2", &reg.id, Bytes::from_static(b"x"))
                .await
                .is_err()
        );
        assert!(registry.interrupt("u2", &reg.id).await.is_err());
        registry
            .send_input("u1", &reg.id, Bytes::from_static(b"x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn interrupt_fires_once() {
        let registry = ProcessRegistry::new();
        let reg = registry.register("u1", "sleep 10").await;

        registry.interrupt("u1", &reg.id).await.unwrap();
        registry.interrupt("u1", &reg.id).await.unwrap();
        assert!(reg.interrupt_rx.await.is_ok());
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let registry = ProcessRegistry::new();
        let reg = registry.register("u1", "cat").await;
        registry
            .send_input("u1", &reg.id, Bytes::new())
            .await
            .unwrap();
        assert_eq!(registry.len().await, 1);
    }
}

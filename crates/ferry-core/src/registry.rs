//! Connection registry: which clients are connected and how to reach them.
//!
//! The registry is shared by every connection task. All mutation happens
//! under one write lock, and the roster broadcast that follows each change is
//! queued before that lock is released, so clients observe roster updates
//! in the same order the registry changed.

use crate::connection::{ClientId, ConnectionHandle};
use crate::error::{RelayError, Result};
use crate::roster::{self, RosterReport};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Proof of one registration, used to release it at teardown.
///
/// Identities collide only if the same `ip:port` reconnects before the old
/// connection's teardown ran. The later registration wins; releasing the
/// earlier ticket then leaves the newer entry in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    id: ClientId,
    seq: u64,
}

impl Registration {
    /// Identity this registration is for
    #[must_use]
    pub fn id(&self) -> &ClientId {
        &self.id
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    handle: ConnectionHandle,
}

#[derive(Debug, Default)]
struct Entries {
    next_seq: u64,
    clients: HashMap<ClientId, Entry>,
}

impl Entries {
    /// Handles in registration order
    fn ordered(&self) -> Vec<ConnectionHandle> {
        let mut entries: Vec<&Entry> = self.clients.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.handle.clone()).collect()
    }

    fn insert(&mut self, handle: ConnectionHandle) -> Registration {
        let seq = self.next_seq;
        self.next_seq += 1;

        let id = handle.id().clone();
        if let Some(previous) = self.clients.insert(id.clone(), Entry { seq, handle }) {
            tracing::warn!(
                "Client {} re-registered; replacing registration #{}",
                id,
                previous.seq
            );
        }
        Registration { id, seq }
    }

    fn broadcast(&self) -> RosterReport {
        roster::broadcast(&self.ordered())
    }
}

/// Registry of connected clients
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<Entries>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its handle's identity, replacing any
    /// existing entry, then rebroadcast the roster.
    pub async fn register(&self, handle: ConnectionHandle) -> Registration {
        let mut entries = self.entries.write().await;
        let registration = entries.insert(handle);
        entries.broadcast();
        tracing::info!(
            "Registered {} ({} connected)",
            registration.id,
            entries.clients.len()
        );
        registration
    }

    /// Register like [`Registry::register`], unless `limit` clients are
    /// already connected.
    ///
    /// Re-registering an identity that is already present never counts
    /// against the limit.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ServerFull`] without touching the registry or
    /// broadcasting.
    pub async fn try_register(&self, handle: ConnectionHandle, limit: usize) -> Result<Registration> {
        let mut entries = self.entries.write().await;
        if entries.clients.len() >= limit && !entries.clients.contains_key(handle.id()) {
            return Err(RelayError::ServerFull { limit });
        }

        let registration = entries.insert(handle);
        entries.broadcast();
        tracing::info!(
            "Registered {} ({} connected)",
            registration.id,
            entries.clients.len()
        );
        Ok(registration)
    }

    /// Remove `id` if present and rebroadcast the roster.
    ///
    /// Returns whether an entry was removed. Removing an absent identity is
    /// a no-op.
    pub async fn unregister(&self, id: &ClientId) -> bool {
        let mut entries = self.entries.write().await;
        if entries.clients.remove(id).is_none() {
            return false;
        }

        entries.broadcast();
        tracing::info!("Unregistered {} ({} connected)", id, entries.clients.len());
        true
    }

    /// Remove the entry created by `registration`, unless a later
    /// registration for the same identity has replaced it.
    pub async fn release(&self, registration: &Registration) -> bool {
        let mut entries = self.entries.write().await;
        match entries.clients.get(&registration.id) {
            Some(entry) if entry.seq == registration.seq => {}
            _ => return false,
        }

        entries.clients.remove(&registration.id);
        entries.broadcast();
        tracing::info!(
            "Released {} ({} connected)",
            registration.id,
            entries.clients.len()
        );
        true
    }

    /// Find the handle for `id`.
    pub async fn lookup(&self, id: &ClientId) -> Option<ConnectionHandle> {
        self.entries
            .read()
            .await
            .clients
            .get(id)
            .map(|e| e.handle.clone())
    }

    /// Every registered identity except `id`, in registration order.
    pub async fn snapshot_excluding(&self, id: &ClientId) -> Vec<ClientId> {
        self.entries
            .read()
            .await
            .ordered()
            .iter()
            .map(|h| h.id())
            .filter(|other| *other != id)
            .cloned()
            .collect()
    }

    /// Whether `id` is registered
    pub async fn contains(&self, id: &ClientId) -> bool {
        self.entries.read().await.clients.contains_key(id)
    }

    /// Number of registered clients
    pub async fn len(&self) -> usize {
        self.entries.read().await.clients.len()
    }

    /// Whether no clients are registered
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OutboundFrame;
    use crate::protocol::ServerMessage;
    use tokio::sync::mpsc::Receiver;

    fn client(id: &str) -> (ConnectionHandle, Receiver<OutboundFrame>) {
        ConnectionHandle::channel(ClientId::from(id))
    }

    /// Drain queued frames and return the most recent roster.
    fn latest_roster(rx: &mut Receiver<OutboundFrame>) -> Option<Vec<ClientId>> {
        let mut latest = None;
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                if let Ok(ServerMessage::Clients(ids)) = ServerMessage::from_text(&text) {
                    latest = Some(ids);
                }
            }
        }
        latest
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = Registry::new();
        let (a, _rx_a) = client("a:1");

        let registration = registry.register(a).await;
        assert_eq!(registration.id(), &ClientId::from("a:1"));
        assert!(registry.contains(&ClientId::from("a:1")).await);
        assert!(registry.lookup(&ClientId::from("a:1")).await.is_some());
        assert!(registry.lookup(&ClientId::from("z:9")).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_broadcasts_roster() {
        let registry = Registry::new();
        let (a, mut rx_a) = client("a:1");
        let (b, mut rx_b) = client("b:2");

        registry.register(a).await;
        assert_eq!(latest_roster(&mut rx_a), Some(vec![]));

        registry.register(b).await;
        assert_eq!(latest_roster(&mut rx_a), Some(vec![ClientId::from("b:2")]));
        assert_eq!(latest_roster(&mut rx_b), Some(vec![ClientId::from("a:1")]));
    }

    #[tokio::test]
    async fn test_unregister_broadcasts_and_is_idempotent() {
        let registry = Registry::new();
        let (a, mut rx_a) = client("a:1");
        let (b, _rx_b) = client("b:2");
        registry.register(a).await;
        registry.register(b).await;
        latest_roster(&mut rx_a);

        assert!(registry.unregister(&ClientId::from("b:2")).await);
        assert_eq!(latest_roster(&mut rx_a), Some(vec![]));

        assert!(!registry.unregister(&ClientId::from("b:2")).await);
        assert_eq!(latest_roster(&mut rx_a), None);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_excluding_in_registration_order() {
        let registry = Registry::new();
        let mut receivers = Vec::new();
        for id in ["c:3", "a:1", "b:2"] {
            let (handle, rx) = client(id);
            receivers.push(rx);
            registry.register(handle).await;
        }

        assert_eq!(
            registry.snapshot_excluding(&ClientId::from("a:1")).await,
            vec![ClientId::from("c:3"), ClientId::from("b:2")]
        );
        assert_eq!(
            registry.snapshot_excluding(&ClientId::from("nobody:0")).await.len(),
            3
        );
    }

    #[tokio::test]
    async fn test_last_writer_wins_and_stale_release() {
        let registry = Registry::new();
        let (first, _rx1) = client("a:1");
        let (second, mut rx2) = client("a:1");

        let old = registry.register(first).await;
        let new = registry.register(second).await;
        assert_eq!(registry.len().await, 1);

        // Frames to the identity now reach the second connection
        let handle = registry.lookup(&ClientId::from("a:1")).await.unwrap();
        latest_roster(&mut rx2);
        handle.send_text("hello".to_string()).await.unwrap();
        assert_eq!(rx2.try_recv(), Ok(OutboundFrame::Text("hello".to_string())));

        assert!(!registry.release(&old).await);
        assert!(registry.contains(&ClientId::from("a:1")).await);

        assert!(registry.release(&new).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_try_register_respects_limit() {
        let registry = Registry::new();
        let (a, _rx_a) = client("a:1");
        let (b, mut rx_b) = client("b:2");
        let (a_again, _rx_a2) = client("a:1");

        registry.try_register(a, 1).await.unwrap();
        let err = registry.try_register(b, 1).await.unwrap_err();
        assert!(matches!(err, RelayError::ServerFull { limit: 1 }));
        assert!(rx_b.try_recv().is_err());

        assert!(registry.try_register(a_again, 1).await.is_ok());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_port_distinguishes_clients() {
        let registry = Registry::new();
        let (a, _rx_a) = ConnectionHandle::channel(ClientId::from_addr("10.1.1.1:5000".parse().unwrap()));
        let (b, _rx_b) = ConnectionHandle::channel(ClientId::from_addr("10.1.1.1:5001".parse().unwrap()));

        registry.register(a).await;
        registry.register(b).await;
        assert_eq!(registry.len().await, 2);

        registry.unregister(&ClientId::from("10.1.1.1:5000")).await;
        assert!(registry.contains(&ClientId::from("10.1.1.1:5001")).await);
    }
}

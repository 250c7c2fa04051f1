//! Connection identity and the sending half of a live connection.
//!
//! The transport owns the socket. What the relay core holds is a
//! [`ConnectionHandle`]: a cheap clone of the sender side of the connection's
//! bounded outbound queue. A single writer task per connection drains that
//! queue, so any number of tasks may hold a handle while writes to the wire
//! stay serialized.

use crate::error::{RelayError, Result};
use crate::protocol::ServerMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Identity of a connected client, derived from its remote `ip:port`.
///
/// The IP is rendered bare (no brackets around IPv6 literals) so that the
/// identities clients see in the roster are the same strings they send
/// back as `recipient` values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Derive the identity for a connection accepted from `addr`.
    #[must_use]
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self(format!("{}:{}", addr.ip(), addr.port()))
    }

    /// Borrow the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A frame received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text frame carrying a JSON control message
    Text(String),
    /// Binary frame carrying one file's payload
    Binary(Vec<u8>),
}

/// A frame queued for delivery to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text frame (always a serialized [`ServerMessage`])
    Text(String),
    /// Binary frame (a forwarded file payload)
    Binary(Vec<u8>),
}

/// Frames a connection's outbound queue holds before senders have to wait
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Capability to send frames on one connection.
///
/// The queue behind it is bounded. [`ConnectionHandle::send_text`] and
/// friends wait for room, so a client that stops reading slows down whoever
/// is sending to it instead of growing the queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ClientId,
    tx: mpsc::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    /// Create a handle for `id` together with the queue its writer drains.
    #[must_use]
    pub fn channel(id: ClientId) -> (Self, mpsc::Receiver<OutboundFrame>) {
        Self::with_capacity(id, DEFAULT_QUEUE_CAPACITY)
    }

    /// Like [`ConnectionHandle::channel`] with a queue of `capacity` frames
    /// (at least one).
    #[must_use]
    pub fn with_capacity(id: ClientId, capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    /// Identity of the connection this handle writes to.
    #[must_use]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Queue a text frame, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the connection's writer is gone.
    pub async fn send_text(&self, text: String) -> Result<()> {
        self.send(OutboundFrame::Text(text)).await
    }

    /// Queue a binary frame, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the connection's writer is gone.
    pub async fn send_binary(&self, bytes: Vec<u8>) -> Result<()> {
        self.send(OutboundFrame::Binary(bytes)).await
    }

    /// Serialize and queue a relay message, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the writer is gone.
    pub async fn send_message(&self, message: &ServerMessage) -> Result<()> {
        self.send_text(message.to_text()?).await
    }

    /// Serialize and queue a relay message only if there is room right now.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::QueueFull`] if the queue is full and
    /// [`RelayError::Transport`] if the writer is gone.
    pub fn try_send_message(&self, message: &ServerMessage) -> Result<()> {
        self.tx
            .try_send(OutboundFrame::Text(message.to_text()?))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => RelayError::QueueFull(self.id.clone()),
                mpsc::error::TrySendError::Closed(_) => RelayError::Transport(self.id.clone()),
            })
    }

    /// Whether the writer side of this connection has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| RelayError::Transport(self.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_id_from_ipv4() {
        let addr: SocketAddr = "192.168.1.20:53211".parse().unwrap();
        assert_eq!(ClientId::from_addr(addr).as_str(), "192.168.1.20:53211");
    }

    #[test]
    fn test_client_id_from_ipv6_is_unbracketed() {
        let addr: SocketAddr = "[::1]:8000".parse().unwrap();
        assert_eq!(ClientId::from_addr(addr).as_str(), "::1:8000");
    }

    #[test]
    fn test_client_ids_differing_by_port() {
        let a = ClientId::from_addr("10.0.0.1:4000".parse().unwrap());
        let b = ClientId::from_addr("10.0.0.1:4001".parse().unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_client_id_serializes_as_plain_string() {
        let id = ClientId::from("1.2.3.4:5");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1.2.3.4:5\"");
    }

    #[tokio::test]
    async fn test_handle_queues_frames_in_order() {
        let (handle, mut rx) = ConnectionHandle::channel(ClientId::from("a:1"));
        handle.send_text("first".to_string()).await.unwrap();
        handle.send_binary(vec![1, 2, 3]).await.unwrap();

        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("first".to_string())));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Binary(vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn test_send_after_writer_dropped() {
        let (handle, rx) = ConnectionHandle::channel(ClientId::from("a:1"));
        drop(rx);

        assert!(handle.is_closed());
        let err = handle.send_binary(vec![0]).await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(id) if id.as_str() == "a:1"));

        let err = handle
            .try_send_message(&ServerMessage::Clients(vec![]))
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_send_waits_for_room() {
        let (handle, mut rx) = ConnectionHandle::with_capacity(ClientId::from("a:1"), 1);
        handle.send_binary(vec![1]).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), handle.send_binary(vec![2]));
        assert!(blocked.await.is_err());

        assert_eq!(rx.recv().await, Some(OutboundFrame::Binary(vec![1])));
        handle.send_binary(vec![3]).await.unwrap();
        assert_eq!(rx.recv().await, Some(OutboundFrame::Binary(vec![3])));
    }

    #[test]
    fn test_try_send_on_full_queue() {
        let (handle, _rx) = ConnectionHandle::with_capacity(ClientId::from("a:1"), 1);
        handle.try_send_message(&ServerMessage::Clients(vec![])).unwrap();

        let err = handle
            .try_send_message(&ServerMessage::Clients(vec![]))
            .unwrap_err();
        assert!(matches!(err, RelayError::QueueFull(id) if id.as_str() == "a:1"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (handle, _rx) = ConnectionHandle::with_capacity(ClientId::from("a:1"), 0);
        assert!(handle.try_send_message(&ServerMessage::Clients(vec![])).is_ok());
    }
}

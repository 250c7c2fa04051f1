//! Per-connection frame driver.
//!
//! A [`Peer`] is what a connection task owns: its handle, its registration
//! and its transfer session. The transport feeds it inbound frames one at a
//! time; a returned error means the connection must be closed.

use crate::connection::{ClientId, ConnectionHandle, InboundFrame};
use crate::dispatch::{self, DispatchOutcome};
use crate::error::{ProtocolError, RelayError, Result};
use crate::protocol::{ControlFrame, ServerMessage};
use crate::registry::{Registration, Registry};
use crate::session::{Step, TransferSession};
use std::sync::Arc;

/// A registered connection and its transfer session
pub struct Peer {
    handle: ConnectionHandle,
    registration: Registration,
    registry: Arc<Registry>,
    session: TransferSession,
}

impl Peer {
    /// Register `handle` and start with an idle session.
    pub async fn join(registry: Arc<Registry>, handle: ConnectionHandle) -> Self {
        let registration = registry.register(handle.clone()).await;
        Self::with_registration(registry, handle, registration)
    }

    /// Register `handle` unless `limit` clients are already connected.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ServerFull`] when the registry is at the limit.
    pub async fn try_join(
        registry: Arc<Registry>,
        handle: ConnectionHandle,
        limit: usize,
    ) -> Result<Self> {
        let registration = registry.try_register(handle.clone(), limit).await?;
        Ok(Self::with_registration(registry, handle, registration))
    }

    fn with_registration(
        registry: Arc<Registry>,
        handle: ConnectionHandle,
        registration: Registration,
    ) -> Self {
        Self {
            handle,
            registration,
            registry,
            session: TransferSession::new(),
        }
    }

    /// Identity of this connection
    #[must_use]
    pub fn id(&self) -> &ClientId {
        self.handle.id()
    }

    /// This connection's transfer session
    #[must_use]
    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Process one inbound frame.
    ///
    /// # Errors
    ///
    /// A [`RelayError::Protocol`] is returned after the client has been sent
    /// an `error` frame. A [`RelayError::Transport`] means this connection's
    /// writer is gone. Both end the connection.
    pub async fn on_frame(&mut self, frame: InboundFrame) -> Result<()> {
        match frame {
            InboundFrame::Text(text) => self.on_text(&text).await,
            InboundFrame::Binary(bytes) => self.on_binary(bytes).await,
        }
    }

    async fn on_text(&mut self, text: &str) -> Result<()> {
        let frame = match ControlFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => return Err(self.reject(e).await),
        };

        tracing::debug!("{} -> {}", self.id(), frame.frame_type());
        if self.session.apply(frame) == Step::Ignored {
            tracing::debug!("Ignoring unhandled control frame from {}", self.id());
        }
        Ok(())
    }

    async fn on_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        let len = bytes.len();
        match self.session.push_payload(bytes) {
            Step::Ready(transfer) => {
                let outcome = dispatch::dispatch(&self.registry, &self.handle, transfer).await?;
                if outcome == DispatchOutcome::Unresolved {
                    tracing::debug!("{} transfer discarded", self.id());
                }
                Ok(())
            }
            Step::Ignored => {
                tracing::debug!(
                    "Dropping {} byte payload from {}: no transfer declared",
                    len,
                    self.id()
                );
                Ok(())
            }
            Step::Continue => {
                tracing::debug!(
                    "{} payload {}/{} ({} bytes)",
                    self.id(),
                    self.session.filled_count(),
                    self.session.expected_count(),
                    len
                );
                Ok(())
            }
        }
    }

    /// Tell the client its frame was malformed; the send is best effort.
    async fn reject(&self, error: ProtocolError) -> RelayError {
        tracing::warn!("Protocol error from {}: {}", self.id(), error);
        let notice = ServerMessage::Error(error.wire_message().to_string());
        if let Err(e) = self.handle.send_message(&notice).await {
            tracing::debug!("Could not report protocol error to {}: {}", self.id(), e);
        }
        RelayError::Protocol(error)
    }

    /// Unregister this connection and rebroadcast the roster.
    pub async fn leave(self) {
        if !self.registry.release(&self.registration).await {
            tracing::debug!("{} was already replaced in the registry", self.id());
        }
    }
}

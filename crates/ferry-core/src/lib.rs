//! # Ferry Core
//!
//! Relay logic for Ferry, a rendezvous relay that lets connected peers see
//! each other and hand files across without the relay storing anything.
//!
//! This crate provides:
//! - Connection registry with last-writer-wins identity collisions
//! - Roster broadcast on every registry change
//! - Per-connection transfer session state machine
//! - Relay dispatch of completed transfers
//! - JSON wire protocol for control frames
//!
//! It holds no sockets. A transport accepts connections, wraps each one's
//! outbound queue in a [`ConnectionHandle`], and feeds inbound frames to a
//! [`Peer`].
//!
//! ## Architecture
//!
//! ```text
//!   transport ──frames──▶ Peer ──▶ TransferSession
//!                          │              │ Ready
//!                          │              ▼
//!                          │          dispatch ──lookup──▶ Registry
//!                          │                                  │
//!                     join / leave ──────────────────────▶ roster broadcast
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ferry_core::{ClientId, ConnectionHandle, InboundFrame, Peer, Registry};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), ferry_core::RelayError> {
//! let registry = Arc::new(Registry::new());
//! let (handle, _outbound) = ConnectionHandle::channel(ClientId::from("127.0.0.1:50000"));
//! let mut peer = Peer::join(registry.clone(), handle).await;
//!
//! peer.on_frame(InboundFrame::Text(
//!     r#"{"type":"recipient","value":"127.0.0.1:50001"}"#.to_string(),
//! ))
//! .await?;
//! peer.leave().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod roster;
pub mod session;

pub use connection::{ClientId, ConnectionHandle, DEFAULT_QUEUE_CAPACITY, InboundFrame, OutboundFrame};
pub use dispatch::{DispatchOutcome, dispatch};
pub use error::{ProtocolError, RelayError, Result};
pub use peer::Peer;
pub use protocol::{ControlFrame, ServerMessage};
pub use registry::{Registration, Registry};
pub use roster::RosterReport;
pub use session::{CompletedTransfer, FileUnit, Step, TransferSession, TransferState};

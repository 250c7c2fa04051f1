//! Error types for the Ferry relay core.
//!
//! Errors follow the relay's failure taxonomy:
//!
//! - **Protocol**: a client sent a control frame the relay cannot parse.
//!   Fatal to that client's connection only.
//! - **RecipientUnresolved**: the chosen recipient is not connected at
//!   dispatch time. Recoverable; the sender keeps its connection.
//! - **Transport**: a connection's writer is gone. Isolated to that
//!   connection.
//! - **QueueFull**: a roster update found a client's outbound queue full.
//!   Only that client misses the update.

use crate::connection::ClientId;
use thiserror::Error;

/// Errors raised while parsing client control frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Text frame is not a JSON object with a string `type`
    #[error("invalid JSON control frame: {0}")]
    InvalidJson(String),

    /// `files-length` value is not a non-negative integer
    #[error("invalid files-length value: {0}")]
    InvalidFileCount(String),

    /// `recipient` value is not a string
    #[error("invalid recipient value: {0}")]
    InvalidRecipient(String),
}

impl ProtocolError {
    /// Text sent back to the client in the `error` frame.
    #[must_use]
    pub fn wire_message(&self) -> &'static str {
        match self {
            ProtocolError::InvalidJson(_) => "Invalid JSON",
            ProtocolError::InvalidFileCount(_) => "Invalid files-length",
            ProtocolError::InvalidRecipient(_) => "Invalid recipient",
        }
    }
}

/// Relay core errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed control frame
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Recipient not registered when the transfer completed
    #[error("recipient not found: {0}")]
    RecipientUnresolved(ClientId),

    /// The connection's writer has gone away
    #[error("transport closed for {0}")]
    Transport(ClientId),

    /// The connection's outbound queue had no room for a frame that may not wait
    #[error("outbound queue full for {0}")]
    QueueFull(ClientId),

    /// Registry is at its configured client limit
    #[error("server at capacity ({limit} clients)")]
    ServerFull {
        /// Configured limit
        limit: usize,
    },

    /// JSON (de)serialization of a relay message failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether this error ends the connection it occurred on.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RelayError::RecipientUnresolved(_))
    }
}

/// Result type for relay core operations
pub type Result<T> = std::result::Result<T, RelayError>;

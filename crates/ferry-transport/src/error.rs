//! Transport layer errors.

use ferry_core::RelayError;
use std::io;
use tokio_tungstenite::tungstenite;

/// Relay server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// I/O error from the listener or a socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// WebSocket handshake or framing error
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// Error raised by the relay core for one connection
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// A connection's writer task panicked or was cancelled
    #[error("writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<tungstenite::Error> for ServerError {
    fn from(err: tungstenite::Error) -> Self {
        ServerError::WebSocket(Box::new(err))
    }
}

impl ServerError {
    /// Whether the connection ended because the peer simply went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::WebSocket(e) => matches!(
                **e,
                tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Protocol(
                        tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
                    )
            ),
            ServerError::Relay(RelayError::Transport(_)) => true,
            _ => false,
        }
    }
}

/// Result type for transport operations
pub type ServerResult<T> = Result<T, ServerError>;

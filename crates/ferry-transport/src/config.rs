//! Relay server configuration.

use crate::error::ServerError;
use ferry_core::DEFAULT_QUEUE_CAPACITY;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default WebSocket endpoint path
pub const DEFAULT_PATH: &str = "/ws";

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Address to accept TCP connections on
    pub listen_addr: SocketAddr,
    /// Request path the WebSocket upgrade must target
    pub path: String,
    /// Maximum number of concurrently registered clients
    pub max_clients: usize,
    /// Largest accepted message (and frame) in bytes; bounds one file payload
    pub max_message_size: usize,
    /// Frames each connection's outbound queue holds before senders wait
    pub outbound_queue: usize,
    /// How long to wait for queued frames to flush when a connection ends
    pub close_timeout: Duration,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            path: DEFAULT_PATH.to_string(),
            max_clients: 10_000,
            max_message_size: 64 * 1024 * 1024, // 64 MiB
            outbound_queue: DEFAULT_QUEUE_CAPACITY,
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl RelayServerConfig {
    /// Default configuration listening on `listen_addr`
    #[must_use]
    pub fn with_listen_addr(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Self::default()
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !self.path.starts_with('/') {
            return Err(ServerError::InvalidConfig(format!(
                "path '{}' must start with '/'",
                self.path
            )));
        }
        if self.max_clients == 0 {
            return Err(ServerError::InvalidConfig(
                "max_clients must be at least 1".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ServerError::InvalidConfig(
                "max_message_size must be at least 1 byte".to_string(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(ServerError::InvalidConfig(
                "outbound_queue must be at least 1 frame".to_string(),
            ));
        }
        Ok(())
    }

    /// WebSocket protocol limits derived from this configuration
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayServerConfig::default();
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(config.path, "/ws");
        assert_eq!(config.max_clients, 10_000);
        assert_eq!(config.outbound_queue, DEFAULT_QUEUE_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RelayServerConfig::default();
        config.path = "ws".to_string();
        assert!(config.validate().is_err());

        config.path = "/relay".to_string();
        config.max_clients = 0;
        assert!(config.validate().is_err());

        config.max_clients = 1;
        config.max_message_size = 0;
        assert!(config.validate().is_err());

        config.max_message_size = 1024;
        config.outbound_queue = 0;
        assert!(config.validate().is_err());

        config.outbound_queue = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_websocket_limits() {
        let mut config = RelayServerConfig::default();
        config.max_message_size = 1024;

        let ws = config.websocket_config();
        assert_eq!(ws.max_message_size, Some(1024));
        assert_eq!(ws.max_frame_size, Some(1024));
    }
}

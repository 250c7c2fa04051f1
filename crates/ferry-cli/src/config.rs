//! Configuration file for the Ferry CLI.

use ferry_transport::RelayServerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ferry configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relay server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// WebSocket endpoint path
    #[serde(default = "default_path")]
    pub path: String,
    /// Maximum concurrently connected clients
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Largest accepted message in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Frames queued per connection before senders to it wait
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Seconds to wait for a closing connection to flush
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_max_clients() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    64 * 1024 * 1024 // 64 MiB
}

fn default_outbound_queue() -> usize {
    64
}

fn default_close_timeout_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            path: default_path(),
            max_clients: default_max_clients(),
            max_message_size: default_max_message_size(),
            outbound_queue: default_outbound_queue(),
            close_timeout_secs: default_close_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("ferry/config.toml")
    }

    /// Load config from the default path, falling back to built-in defaults
    /// when no file exists there
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address '{}': {}", self.server.listen_addr, e))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;

        if !self.server.path.starts_with('/') {
            anyhow::bail!("Path '{}' must start with '/'", self.server.path);
        }

        if self.server.max_clients == 0 {
            anyhow::bail!("max_clients must be at least 1");
        }

        if self.server.max_message_size == 0 {
            anyhow::bail!("max_message_size must be at least 1 byte");
        }

        if self.server.outbound_queue == 0 {
            anyhow::bail!("outbound_queue must be at least 1 frame");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Build the relay server configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be parsed.
    pub fn relay_config(&self) -> anyhow::Result<RelayServerConfig> {
        Ok(RelayServerConfig {
            listen_addr: self.parse_listen_addr()?,
            path: self.server.path.clone(),
            max_clients: self.server.max_clients,
            max_message_size: self.server.max_message_size,
            outbound_queue: self.server.outbound_queue,
            close_timeout: Duration::from_secs(self.server.close_timeout_secs),
        })
    }
}

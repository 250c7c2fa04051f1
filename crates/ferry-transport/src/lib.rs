//! # Ferry Transport
//!
//! WebSocket transport for the Ferry relay.
//!
//! Accepts TCP connections, performs the WebSocket upgrade on the configured
//! path, derives each client's identity from its remote `ip:port`, and runs
//! one reader task plus one writer task per connection around a
//! [`ferry_core::Peer`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use ferry_transport::{RelayServer, RelayServerConfig};
//!
//! # async fn example() -> Result<(), ferry_transport::ServerError> {
//! let config = RelayServerConfig::with_listen_addr("0.0.0.0:8000".parse().unwrap());
//! let server = RelayServer::bind_with_config(config).await?;
//!
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod server;

pub use config::RelayServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::RelayServer;

//! Relay server accept loop.

use crate::config::RelayServerConfig;
use crate::connection;
use crate::error::{ServerError, ServerResult};
use ferry_core::Registry;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

/// WebSocket rendezvous relay server
pub struct RelayServer {
    /// Bound listener
    listener: TcpListener,
    /// Connected clients, shared by every connection task
    registry: Arc<Registry>,
    /// Server configuration
    config: Arc<RelayServerConfig>,
}

impl RelayServer {
    /// Bind a relay server with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if binding fails.
    pub async fn bind(bind_addr: SocketAddr) -> ServerResult<Self> {
        Self::bind_with_config(RelayServerConfig::with_listen_addr(bind_addr)).await
    }

    /// Bind a relay server with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or binding fails.
    pub async fn bind_with_config(config: RelayServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr).await?;

        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
        })
    }

    /// Address the server is listening on
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be determined.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry of connected clients
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get number of connected clients
    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

    /// Run the relay server until the process exits.
    ///
    /// # Errors
    ///
    /// Returns error only if the listener address cannot be read.
    pub async fn run(self) -> ServerResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the relay server until `shutdown` resolves.
    ///
    /// Once shutdown is signalled no new connections are accepted. Live
    /// connections get `close_timeout` to finish, after which they are
    /// aborted.
    ///
    /// # Errors
    ///
    /// Returns error only if the listener address cannot be read.
    pub async fn run_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "Relay server listening on ws://{}{}",
            self.local_addr()?,
            self.config.path
        );

        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            self.registry.clone(),
                            self.config.clone(),
                        ));
                    }
                    Err(e) => tracing::warn!("Accept error: {}", e),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        tracing::info!(
            "Relay server shutting down ({} connections open)",
            connections.len()
        );
        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(self.config.close_timeout, drain).await.is_err() {
            tracing::warn!("Aborting connections still open after {:?}", self.config.close_timeout);
            connections.shutdown().await;
        }
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    config: Arc<RelayServerConfig>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
    }

    tracing::info!("Accepted connection from {}", addr);
    match connection::serve(stream, addr, registry, config).await {
        Ok(()) => tracing::info!("Client {} disconnected", addr),
        Err(e) if e.is_disconnect() => tracing::info!("Client {} went away: {}", addr, e),
        Err(ServerError::Relay(e)) => tracing::info!("Closed {}: {}", addr, e),
        Err(e) => tracing::warn!("Connection {} ended with error: {}", addr, e),
    }
}

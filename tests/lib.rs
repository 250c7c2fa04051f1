//! Test helpers for Ferry integration tests
//!
//! Starts a relay on a loopback port and drives it with real WebSocket
//! clients.

use ferry_core::{ClientId, Registry, ServerMessage};
use ferry_transport::{RelayServer, RelayServerConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

/// How long a test waits for any single frame
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A relay running in the background for the duration of a test
pub struct TestRelay {
    /// Address the relay listens on
    pub addr: SocketAddr,
    /// The relay's registry
    pub registry: Arc<Registry>,
    task: JoinHandle<()>,
}

impl TestRelay {
    /// Start a relay with default settings on `127.0.0.1:0`
    pub async fn start() -> Self {
        Self::start_with(RelayServerConfig::with_listen_addr(
            "127.0.0.1:0".parse().unwrap(),
        ))
        .await
    }

    /// Start a relay with a custom configuration
    pub async fn start_with(config: RelayServerConfig) -> Self {
        let server = RelayServer::bind_with_config(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            registry,
            task,
        }
    }

    /// WebSocket URL for `path` on this relay
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Something a test client received
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// JSON control message
    Message(ServerMessage),
    /// Binary payload
    Binary(Vec<u8>),
    /// Connection closed by the relay
    Closed,
}

/// A WebSocket client connected to a test relay
pub struct TestClient {
    /// Identity the relay derives for this client
    pub id: ClientId,
    ws: WebSocketStream<TcpStream>,
}

impl TestClient {
    /// Connect to the relay's `/ws` endpoint
    pub async fn connect(relay: &TestRelay) -> Self {
        Self::try_connect(relay, "/ws").await.unwrap()
    }

    /// Connect to an arbitrary path
    pub async fn try_connect(relay: &TestRelay, path: &str) -> Result<Self, tungstenite::Error> {
        let stream = TcpStream::connect(relay.addr).await?;
        let id = ClientId::from_addr(stream.local_addr()?);
        let (ws, _response) = tokio_tungstenite::client_async(relay.url(path), stream).await?;
        Ok(Self { id, ws })
    }

    /// Send a JSON control frame
    pub async fn send_json(&mut self, value: Value) {
        self.ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    /// Send raw text (for malformed frames)
    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    /// Send a binary payload
    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.ws.send(Message::Binary(bytes.to_vec())).await.unwrap();
    }

    /// Next frame, skipping pings and pongs
    pub async fn recv(&mut self) -> Received {
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a frame");
            match next {
                Some(Ok(Message::Text(text))) => {
                    return Received::Message(ServerMessage::from_text(&text).unwrap());
                }
                Some(Ok(Message::Binary(bytes))) => return Received::Binary(bytes),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return Received::Closed,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Next frame that is not a roster update
    pub async fn recv_non_roster(&mut self) -> Received {
        loop {
            match self.recv().await {
                Received::Message(ServerMessage::Clients(_)) => continue,
                other => return other,
            }
        }
    }

    /// Wait until a roster equal (as a set) to `expected` arrives
    pub async fn wait_for_roster(&mut self, expected: &[&ClientId]) {
        let mut expected: Vec<ClientId> = expected.iter().map(|id| (*id).clone()).collect();
        expected.sort();

        loop {
            match self.recv().await {
                Received::Message(ServerMessage::Clients(mut roster)) => {
                    roster.sort();
                    if roster == expected {
                        return;
                    }
                }
                Received::Closed => panic!("connection closed while waiting for roster"),
                _ => {}
            }
        }
    }

    /// Assert nothing but roster updates arrives within `wait`
    pub async fn expect_quiet(&mut self, wait: Duration) {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Err(_) => return,
                Ok(Some(Ok(Message::Text(text)))) => {
                    let message = ServerMessage::from_text(&text).unwrap();
                    assert!(
                        matches!(message, ServerMessage::Clients(_)),
                        "unexpected message {message:?}"
                    );
                }
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
                Ok(other) => panic!("unexpected frame {other:?}"),
            }
        }
    }

    /// Close the connection
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Shorthand for a relay text message
pub fn message(value: &str) -> Received {
    Received::Message(ServerMessage::Message(value.to_string()))
}

/// Shorthand for a relay error message
pub fn error(value: &str) -> Received {
    Received::Message(ServerMessage::Error(value.to_string()))
}

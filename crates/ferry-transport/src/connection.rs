//! Per-connection tasks.
//!
//! Each accepted socket gets a reader (this task) and a writer (spawned).
//! The writer is the only code that touches the socket's sending half; the
//! relay core reaches it through the connection's [`ConnectionHandle`]
//! queue. Whichever side stops first ends the connection: a dead writer
//! stops the reader, and the connection leaves the registry either way. The
//! writer finishes once every handle clone is dropped, which happens after
//! the connection leaves the registry.

use crate::config::RelayServerConfig;
use crate::error::ServerResult;
use ferry_core::protocol::SERVER_FULL;
use ferry_core::{
    ClientId, ConnectionHandle, InboundFrame, OutboundFrame, Peer, Registry, ServerMessage,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Which side of a connection stopped first
#[derive(Debug)]
enum Ended {
    /// Client closed, errored or broke protocol; the writer may still flush
    Reader(ServerResult<()>),
    /// Writer stopped; nothing more can be sent on this socket
    Writer(ServerResult<()>),
}

/// Serve one accepted TCP connection until it closes.
///
/// # Errors
///
/// Returns the error that ended the connection. Errors never leak into
/// other connections.
pub async fn serve(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    config: Arc<RelayServerConfig>,
) -> ServerResult<()> {
    let expected_path = config.path.clone();
    let ws = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        move |request: &Request, response: Response| {
            check_path(&expected_path, request, response)
        },
        Some(config.websocket_config()),
    )
    .await?;

    let id = ClientId::from_addr(addr);
    tracing::debug!("WebSocket handshake complete for {}", id);

    let (sink, mut inbound) = ws.split();
    let (handle, outbound) = ConnectionHandle::with_capacity(id.clone(), config.outbound_queue);
    let mut writer = tokio::spawn(write_loop(sink, outbound));

    let peer = match Peer::try_join(registry, handle.clone(), config.max_clients).await {
        Ok(peer) => peer,
        Err(e) => {
            tracing::warn!("Refusing {}: {}", id, e);
            let notice = ServerMessage::Error(SERVER_FULL.to_string());
            if let Err(send_err) = handle.send_message(&notice).await {
                tracing::debug!("Could not report capacity to {}: {}", id, send_err);
            }
            drop(handle);
            finish_writer(&id, &mut writer, config.close_timeout).await;
            return Err(e.into());
        }
    };
    drop(handle);

    match run_peer(peer, &mut inbound, &mut writer).await {
        Ended::Reader(result) => {
            finish_writer(&id, &mut writer, config.close_timeout).await;
            result
        }
        Ended::Writer(result) => {
            tracing::debug!("Writer for {} stopped before its reader", id);
            result
        }
    }
}

/// Run `peer` until its client leaves or its writer stops, then take it out
/// of the registry.
async fn run_peer<S>(
    mut peer: Peer,
    inbound: &mut S,
    writer: &mut JoinHandle<ServerResult<()>>,
) -> Ended
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let ended = tokio::select! {
        result = read_loop(&mut peer, inbound) => Ended::Reader(result),
        joined = &mut *writer => Ended::Writer(joined.unwrap_or_else(|e| Err(e.into()))),
    };

    peer.leave().await;
    ended
}

/// Reject upgrades aimed at any path other than the configured one.
#[allow(clippy::result_large_err)]
fn check_path(
    expected: &str,
    request: &Request,
    response: Response,
) -> Result<Response, ErrorResponse> {
    if request.uri().path() == expected {
        return Ok(response);
    }

    tracing::debug!("Rejecting upgrade for path {}", request.uri().path());
    let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

/// Feed inbound frames to the peer until the client closes or errs.
async fn read_loop<S>(peer: &mut Peer, inbound: &mut S) -> ServerResult<()>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = inbound.next().await {
        let frame = match message? {
            Message::Text(text) => InboundFrame::Text(text),
            Message::Binary(bytes) => InboundFrame::Binary(bytes),
            Message::Close(_) => break,
            // Ping/Pong are answered by tungstenite itself
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };
        peer.on_frame(frame).await?;
    }
    Ok(())
}

/// Drain the outbound queue onto the socket, then close it.
async fn write_loop(
    mut sink: WsSink,
    mut outbound: Receiver<OutboundFrame>,
) -> ServerResult<()> {
    while let Some(frame) = outbound.recv().await {
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text),
            OutboundFrame::Binary(bytes) => Message::Binary(bytes),
        };
        sink.send(message).await?;
    }
    sink.close().await?;
    Ok(())
}

async fn finish_writer(
    id: &ClientId,
    writer: &mut JoinHandle<ServerResult<()>>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, &mut *writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) if e.is_disconnect() => {}
        Ok(Ok(Err(e))) => tracing::debug!("Writer for {} ended with error: {}", id, e),
        Ok(Err(e)) => tracing::warn!("Writer task for {} failed: {}", id, e),
        Err(_) => {
            tracing::warn!("Writer for {} did not flush within {:?}", id, timeout);
            writer.abort();
        }
    }
}

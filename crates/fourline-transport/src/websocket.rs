//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connection, ConnectionId, Transport, TransportError};

type WsStream = WebSocketStream<TcpStream>;
type Accepted = Result<WebSocketConnection, TransportError>;

/// How long a TCP peer gets to finish the WebSocket upgrade by default.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections that finished the handshake but haven't been picked up by
/// [`Transport::accept`] yet.
const ACCEPT_BACKLOG: usize = 64;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// A background task accepts TCP streams and runs each upgrade on its own
/// task under a timeout, so a peer that never finishes the handshake only
/// ever holds up itself. [`Transport::accept`] hands out the connections
/// that made it, in the order they completed.
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    accepted: mpsc::Receiver<Accepted>,
    listener_task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address with the
    /// default handshake timeout.
    ///
    /// Use port 0 to let the OS pick; [`Transport::local_addr`] reports the
    /// result.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with_timeout(addr, DEFAULT_HANDSHAKE_TIMEOUT).await
    }

    /// Binds with an explicit handshake timeout.
    pub async fn bind_with_timeout(
        addr: &str,
        handshake_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr = listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(%local_addr, "WebSocket transport listening");

        let (tx, accepted) = mpsc::channel(ACCEPT_BACKLOG);
        let listener_task = tokio::spawn(listen(listener, tx, handshake_timeout));

        Ok(Self {
            local_addr,
            accepted,
            listener_task,
        })
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.listener_task.abort();
    }
}

/// Accepts TCP streams until the transport goes away. Each stream gets its
/// own handshake task and id.
async fn listen(listener: TcpListener, tx: mpsc::Sender<Accepted>, handshake_timeout: Duration) {
    let mut next_id = 1;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                if tx.send(Err(TransportError::AcceptFailed(e))).await.is_err() {
                    break;
                }
                // Usually out of file descriptors; give the handlers a moment.
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        let id = ConnectionId::new(next_id);
        next_id += 1;
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = handshake(stream, addr, id, handshake_timeout).await;
            // The transport is gone; the stream is dropped with the result.
            let _ = tx.send(result).await;
        });
    }
}

async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    id: ConnectionId,
    timeout: Duration,
) -> Accepted {
    match tokio::time::timeout(timeout, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => {
            tracing::debug!(%id, %addr, "accepted WebSocket connection");
            Ok(WebSocketConnection::new(id, ws))
        }
        Ok(Err(e)) => Err(TransportError::AcceptFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))),
        Err(_) => {
            tracing::debug!(%id, %addr, "WebSocket handshake timed out");
            Err(TransportError::HandshakeTimedOut(addr))
        }
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.accepted
            .recv()
            .await
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        Ok(self.local_addr)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        // Open connections are owned by their handlers.
        self.listener_task.abort();
        Ok(())
    }
}

/// A single WebSocket connection.
///
/// The stream is split so a pending `recv` never holds up a `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

fn send_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::ConnectionClosed
        }
        other => TransportError::SendFailed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            other,
        )),
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// Sends `data` as a text frame when it's UTF-8 (JSON always is),
    /// otherwise as a binary frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink.lock().await.send(msg).await.map_err(send_error)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                )) => return Ok(None),
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(send_error)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

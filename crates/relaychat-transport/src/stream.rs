//! Stream transport: one WebSocket connection per peer, via `tokio-tungstenite`.
//!
//! An accept task admits connections; each connection then gets its own
//! reader task that funnels frames into a single inbound queue. Frames
//! from one connection keep their order. A read error or EOF ends only
//! that connection's task and is reported as [`Incoming::Closed`].
//!
//! Writes go the other way through a bounded per-connection queue and a
//! writer task, so `send` never waits on a socket. A peer that lets its
//! queue fill up is dropped and reported as closed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    CloseSignal, ConnectionId, Delivery, Endpoint, Incoming, Transport,
    TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Back-off after a failed `accept` so a persistent error doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Frames a connection may have queued before the peer counts as stalled.
const OUTBOUND_QUEUE: usize = 64;

/// How long a writer gets to deliver a close frame before it is dropped.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A connection-oriented [`Transport`] over WebSocket.
pub struct StreamTransport {
    local_addr: SocketAddr,
    /// Taken by `open()`; the accept task owns it from then on.
    listener: Mutex<Option<TcpListener>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Incoming>>,
    shared: Arc<Shared>,
}

/// State shared with the accept task and every reader task.
struct Shared {
    connections: Mutex<HashMap<ConnectionId, Arc<StreamConnection>>>,
    inbound: mpsc::UnboundedSender<Incoming>,
    closed: CloseSignal,
}

/// The write side of a single peer connection: a bounded queue drained
/// by the connection's own writer task.
struct StreamConnection {
    id: ConnectionId,
    addr: SocketAddr,
    outbound: mpsc::Sender<Message>,
    /// Flipped to cut this one connection loose; ends its reader and writer.
    dropped: Arc<CloseSignal>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl StreamConnection {
    /// Queues a frame without waiting on the socket.
    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let msg = Message::Binary(data.to_vec().into());
        self.outbound.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                format!("{} stalled: {OUTBOUND_QUEUE} frames queued", self.id),
            )),
            TrySendError::Closed(_) => {
                TransportError::ConnectionClosed(Endpoint::Connection(self.id))
            }
        })
    }

    /// Signals the writer and waits for it. Bounded by [`CLOSE_GRACE`].
    async fn close(&self) {
        self.dropped.close();
        if let Some(task) = self.writer.lock().await.take() {
            if let Err(e) = task.await {
                tracing::debug!(id = %self.id, addr = %self.addr, error = %e, "writer task failed");
            }
        }
    }
}

impl StreamTransport {
    /// Binds the listening socket. Connections are not accepted until
    /// [`Transport::open`] is called.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;
        tracing::info!(%local_addr, "stream transport listening");

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
            accept_task: Mutex::new(None),
            inbound: Mutex::new(rx),
            shared: Arc::new(Shared {
                connections: Mutex::new(HashMap::new()),
                inbound: tx,
                closed: CloseSignal::new(),
            }),
        })
    }

    /// Number of live peer connections.
    pub async fn connection_count(&self) -> usize {
        self.shared.connections.lock().await.len()
    }
}

impl Transport for StreamTransport {
    fn delivery(&self) -> Delivery {
        Delivery::Unicast
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.local_addr)
    }

    async fn open(&self) -> Result<(), TransportError> {
        if self.shared.closed.is_closed() {
            return Err(TransportError::Shutdown);
        }
        let Some(listener) = self.listener.lock().await.take() else {
            tracing::debug!("stream transport already accepting");
            return Ok(());
        };
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&self.shared)));
        *self.accept_task.lock().await = Some(task);
        Ok(())
    }

    async fn send(&self, to: &Endpoint, data: &[u8]) -> Result<(), TransportError> {
        let Endpoint::Connection(id) = to else {
            return Err(TransportError::UnsupportedEndpoint(*to));
        };
        let mut connections = self.shared.connections.lock().await;
        let conn = connections
            .get(id)
            .ok_or(TransportError::ConnectionClosed(*to))?;
        let result = conn.send(data);
        if let Err(TransportError::SendFailed(_)) = &result {
            // The peer stopped reading. Cut it loose; its reader reports
            // the disconnect.
            tracing::warn!(%id, addr = %conn.addr, "dropping stalled connection");
            conn.dropped.close();
            connections.remove(id);
        }
        result
    }

    async fn recv(&self) -> Result<Incoming, TransportError> {
        if self.shared.closed.is_closed() {
            return Err(TransportError::Shutdown);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            _ = self.shared.closed.closed() => Err(TransportError::Shutdown),
            next = inbound.recv() => next.ok_or(TransportError::Shutdown),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.shared.closed.close() {
            return Ok(());
        }
        // Never opened: drop the listener here instead.
        self.listener.lock().await.take();
        if let Some(task) = self.accept_task.lock().await.take() {
            let _ = task.await;
        }

        let connections: Vec<_> = self
            .shared
            .connections
            .lock()
            .await
            .drain()
            .map(|(_, conn)| conn)
            .collect();
        for conn in &connections {
            conn.dropped.close();
        }
        for conn in &connections {
            conn.close().await;
        }

        tracing::info!(addr = %self.local_addr, "stream transport closed");
        Ok(())
    }
}

/// Admits connections until the transport closes.
async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        tokio::select! {
            biased;
            _ = shared.closed.closed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tokio::spawn(serve_connection(stream, addr, Arc::clone(&shared)));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    tracing::debug!("stream accept loop stopped");
}

/// Upgrades one TCP connection and reads frames from it until EOF,
/// error, or transport close.
async fn serve_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(%addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
    let endpoint = Endpoint::Connection(id);
    let (sink, mut frames) = ws.split();
    let (outbound, queued) = mpsc::channel(OUTBOUND_QUEUE);
    let dropped = Arc::new(CloseSignal::new());
    let conn = Arc::new(StreamConnection {
        id,
        addr,
        outbound,
        dropped: Arc::clone(&dropped),
        writer: Mutex::new(None),
    });
    {
        let mut connections = shared.connections.lock().await;
        if shared.closed.is_closed() {
            return;
        }
        let writer = tokio::spawn(write_loop(id, sink, queued, Arc::clone(&dropped)));
        *conn.writer.lock().await = Some(writer);
        connections.insert(id, Arc::clone(&conn));
    }
    tracing::debug!(%id, %addr, "accepted stream connection");

    loop {
        let data = tokio::select! {
            biased;
            _ = shared.closed.closed() => return,
            _ = dropped.closed() => break,
            frame = frames.next() => match frame {
                Some(Ok(Message::Binary(data))) => data.to_vec(),
                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(%id, "connection closed by peer");
                    break;
                }
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    tracing::debug!(%id, error = %e, "stream read failed");
                    break;
                }
            },
        };
        if shared.inbound.send(Incoming::Frame { from: endpoint, data }).is_err() {
            return;
        }
    }

    dropped.close();
    shared.connections.lock().await.remove(&id);
    if !shared.closed.is_closed() {
        let _ = shared.inbound.send(Incoming::Closed { endpoint });
    }
}

/// Drains one connection's outbound queue onto its socket. A write that
/// never completes is abandoned as soon as the connection is dropped.
async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, Message>,
    mut queued: mpsc::Receiver<Message>,
    dropped: Arc<CloseSignal>,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = dropped.closed() => break,
            next = queued.recv() => match next {
                Some(msg) => msg,
                None => break,
            },
        };
        let sent = tokio::select! {
            biased;
            _ = dropped.closed() => break,
            sent = sink.send(msg) => sent,
        };
        if let Err(e) = sent {
            tracing::debug!(%id, error = %e, "stream write failed");
            dropped.close();
            break;
        }
    }
    if tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        tracing::debug!(%id, "close frame not delivered in time");
    }
}

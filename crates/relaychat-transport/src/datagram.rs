//! Datagram transport: one shared UDP socket for every peer.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::{CloseSignal, Delivery, Endpoint, Incoming, Transport, TransportError};

/// A connectionless [`Transport`] over a single UDP socket.
///
/// `send` is fire-and-forget; `recv` yields frames from any sender
/// together with the address they came from.
pub struct DatagramTransport {
    socket: UdpSocket,
    /// Receive buffer sized to the largest accepted frame.
    buf: Mutex<Vec<u8>>,
    closed: CloseSignal,
}

impl DatagramTransport {
    /// Binds the shared socket. `max_frame_len` bounds a single datagram.
    pub async fn bind(addr: SocketAddr, max_frame_len: usize) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(
            local_addr = %socket.local_addr().map_err(TransportError::Bind)?,
            "datagram transport bound"
        );
        Ok(Self {
            socket,
            buf: Mutex::new(vec![0u8; max_frame_len]),
            closed: CloseSignal::new(),
        })
    }
}

impl Transport for DatagramTransport {
    fn delivery(&self) -> Delivery {
        Delivery::Unicast
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Bind)
    }

    async fn open(&self) -> Result<(), TransportError> {
        // Ready as soon as it is bound.
        if self.closed.is_closed() {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }

    async fn send(&self, to: &Endpoint, data: &[u8]) -> Result<(), TransportError> {
        let Endpoint::Addr(addr) = to else {
            return Err(TransportError::UnsupportedEndpoint(*to));
        };
        self.socket
            .send_to(data, addr)
            .await
            .map(|_| ())
            .map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Incoming, TransportError> {
        recv_frame(&self.socket, &self.buf, &self.closed).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.close() {
            tracing::info!("datagram transport closed");
        }
        Ok(())
    }
}

/// Receives one datagram, racing the close signal. Shared with the
/// group transport.
pub(crate) async fn recv_frame(
    socket: &UdpSocket,
    buf: &Mutex<Vec<u8>>,
    closed: &CloseSignal,
) -> Result<Incoming, TransportError> {
    if closed.is_closed() {
        return Err(TransportError::Shutdown);
    }
    let mut buf = buf.lock().await;
    tokio::select! {
        biased;
        _ = closed.closed() => Err(TransportError::Shutdown),
        received = socket.recv_from(&mut buf[..]) => {
            let (len, from) = received.map_err(TransportError::ReceiveFailed)?;
            Ok(Incoming::Frame {
                from: Endpoint::Addr(from),
                data: buf[..len].to_vec(),
            })
        }
    }
}

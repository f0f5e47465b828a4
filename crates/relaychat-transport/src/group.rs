//! Group transport: IPv4 UDP multicast.
//!
//! The socket is configured through `socket2` (address reuse so several
//! members can share a host, outbound interface, loopback on) and then
//! handed to tokio. Membership is explicit: nothing arrives until
//! [`Transport::open`] joins the group, and [`Transport::close`] leaves it.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::datagram::recv_frame;
use crate::{CloseSignal, Delivery, Endpoint, Incoming, Transport, TransportError};

/// A multicast [`Transport`]. Every send addresses the group.
pub struct GroupTransport {
    socket: UdpSocket,
    group: SocketAddrV4,
    interface: Ipv4Addr,
    joined: AtomicBool,
    buf: Mutex<Vec<u8>>,
    closed: CloseSignal,
}

impl GroupTransport {
    /// Binds `0.0.0.0:port` with multicast options set. Must be called
    /// from within a tokio runtime.
    pub fn bind(
        group: Ipv4Addr,
        port: u16,
        interface: Ipv4Addr,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        let socket = make_group_socket(port, interface).map_err(TransportError::Bind)?;
        let socket = UdpSocket::from_std(socket).map_err(TransportError::Bind)?;
        tracing::info!(%group, port, %interface, "group transport bound");
        Ok(Self {
            socket,
            group: SocketAddrV4::new(group, port),
            interface,
            joined: AtomicBool::new(false),
            buf: Mutex::new(vec![0u8; max_frame_len]),
            closed: CloseSignal::new(),
        })
    }
}

impl Transport for GroupTransport {
    fn delivery(&self) -> Delivery {
        Delivery::Multicast
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Bind)
    }

    async fn open(&self) -> Result<(), TransportError> {
        if self.closed.is_closed() {
            return Err(TransportError::Shutdown);
        }
        if self.joined.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.socket.join_multicast_v4(*self.group.ip(), self.interface) {
            self.joined.store(false, Ordering::Release);
            return Err(TransportError::Bind(e));
        }
        tracing::info!(group = %self.group, "joined multicast group");
        Ok(())
    }

    /// Any endpoint addresses the whole group: the network delivers to
    /// every member. [`Endpoint::Group`] says so explicitly.
    async fn send(&self, _to: &Endpoint, data: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(data, SocketAddr::V4(self.group))
            .await
            .map(|_| ())
            .map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Incoming, TransportError> {
        recv_frame(&self.socket, &self.buf, &self.closed).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.close() {
            return Ok(());
        }
        if self.joined.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.socket.leave_multicast_v4(*self.group.ip(), self.interface) {
                tracing::debug!(group = %self.group, error = %e, "leave group failed");
            }
        }
        tracing::info!(group = %self.group, "group transport closed");
        Ok(())
    }
}

/// Creates a non-blocking UDP socket ready for multicast on `port`.
fn make_group_socket(port: u16, interface: Ipv4Addr) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_multicast_if_v4(&interface)?;
    // Members on the same host must see each other's frames.
    socket.set_multicast_loop_v4(true)?;
    // TTL 1: stay on the local network.
    socket.set_multicast_ttl_v4(1)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind_addr.into())?;

    Ok(socket.into())
}

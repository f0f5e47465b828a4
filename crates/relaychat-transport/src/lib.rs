//! Transport abstraction layer for relaychat.
//!
//! Provides the [`Transport`] trait that the router and supervisor are
//! written against, and three implementations of it:
//!
//! - [`StreamTransport`]: connection-oriented. One WebSocket connection
//!   per peer; an accept task plus a reader and a writer task per
//!   connection.
//! - [`DatagramTransport`]: connectionless UDP. One shared socket, one
//!   receive loop for every peer.
//! - [`GroupTransport`]: UDP multicast. Sends address the group; the
//!   network delivers every frame to all members, the sender included.
//!
//! [`AnyTransport`] picks one of the three at runtime from a
//! [`TransportConfig`].
//!
//! # Feature Flags
//!
//! - `stream` (default): stream transport via `tokio-tungstenite`

mod any;
mod config;
mod datagram;
mod error;
mod group;
#[cfg(feature = "stream")]
mod stream;

pub use any::AnyTransport;
pub use config::{
    DEFAULT_GROUP, DEFAULT_GROUP_PORT, DEFAULT_PORT, TransportConfig,
};
pub use datagram::DatagramTransport;
pub use error::TransportError;
pub use group::GroupTransport;
#[cfg(feature = "stream")]
pub use stream::StreamTransport;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use tokio::sync::watch;

/// Opaque identifier for a stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A transport-specific address capable of receiving a frame.
///
/// Stream peers are addressed by their connection handle; datagram and
/// multicast peers by the `(IP, port)` their last frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A dedicated stream connection.
    Connection(ConnectionId),
    /// A socket address on a connectionless transport.
    Addr(SocketAddr),
    /// Every member of the joined multicast group.
    Group,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(id) => id.fmt(f),
            Self::Addr(addr) => addr.fmt(f),
            Self::Group => f.write_str("group"),
        }
    }
}

/// How a transport fans one frame out to many peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every recipient needs its own `send`.
    Unicast,
    /// One `send` reaches every group member, the sender included.
    Multicast,
}

/// An event yielded by [`Transport::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A frame arrived from `from`.
    Frame { from: Endpoint, data: Vec<u8> },
    /// A connection-oriented peer went away (EOF or read error).
    Closed { endpoint: Endpoint },
}

/// The capability set shared by all transports: accept-or-join, send,
/// receive, close.
///
/// Implementations are bound (and so own their local socket) before the
/// trait is used; a bind failure never produces a `Transport`. The
/// returned futures are `Send` so generic callers can drive them from
/// spawned tasks; implementors just write `async fn`.
pub trait Transport: Send + Sync + 'static {
    /// Whether a broadcast needs one send per peer or one send total.
    fn delivery(&self) -> Delivery;

    /// The local address the transport is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;

    /// Starts admitting peers: accepting connections or joining the group.
    fn open(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends one frame to `to`. Failures concern that recipient only.
    fn send(
        &self,
        to: &Endpoint,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next inbound frame or disconnect.
    ///
    /// Returns [`TransportError::Shutdown`] promptly once [`close`] has
    /// been called, even if a call was already blocked.
    ///
    /// [`close`]: Transport::close
    fn recv(&self) -> impl Future<Output = Result<Incoming, TransportError>> + Send;

    /// Closes the transport and unblocks every pending `recv`. Idempotent.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A latch that flips once on close and wakes every waiter.
#[derive(Debug)]
pub(crate) struct CloseSignal(watch::Sender<bool>);

impl CloseSignal {
    pub(crate) fn new() -> Self {
        Self(watch::channel(false).0)
    }

    /// Flips the latch. Returns `true` only for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        !self.0.send_replace(true)
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the latch has been flipped.
    pub(crate) async fn closed(&self) {
        let mut rx = self.0.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_endpoint_display() {
        let conn = Endpoint::Connection(ConnectionId::new(3));
        let addr = Endpoint::Addr("127.0.0.1:9999".parse().unwrap());
        assert_eq!(conn.to_string(), "conn-3");
        assert_eq!(addr.to_string(), "127.0.0.1:9999");
        assert_eq!(Endpoint::Group.to_string(), "group");
    }

    #[test]
    fn test_endpoint_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(Endpoint::Connection(ConnectionId::new(1)), "alice");
        map.insert(Endpoint::Addr("10.0.0.2:4000".parse().unwrap()), "bob");
        assert_eq!(map[&Endpoint::Connection(ConnectionId::new(1))], "alice");
    }

    #[tokio::test]
    async fn test_close_signal_wakes_waiter_and_reports_first_close() {
        let signal = std::sync::Arc::new(CloseSignal::new());
        let waiter = {
            let signal = std::sync::Arc::clone(&signal);
            tokio::spawn(async move { signal.closed().await })
        };

        assert!(!signal.is_closed());
        assert!(signal.close(), "first close flips the latch");
        assert!(!signal.close(), "second close is a no-op");

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_closed());
    }
}

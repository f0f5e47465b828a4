//! Runtime selection between the three transports.

use std::net::SocketAddr;

use crate::{
    DatagramTransport, Delivery, Endpoint, GroupTransport, Incoming, Transport,
    TransportConfig, TransportError,
};
#[cfg(feature = "stream")]
use crate::StreamTransport;

/// One of the concrete transports, chosen from a [`TransportConfig`].
///
/// Static dispatch over an enum keeps the async trait methods usable
/// without boxing.
pub enum AnyTransport {
    #[cfg(feature = "stream")]
    Stream(StreamTransport),
    Datagram(DatagramTransport),
    Group(GroupTransport),
}

impl AnyTransport {
    /// Validates `config` and binds the matching transport.
    ///
    /// # Errors
    /// [`TransportError::InvalidConfig`] if validation fails,
    /// [`TransportError::Bind`] if the socket cannot be opened.
    pub async fn bind(
        config: &TransportConfig,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        match *config {
            #[cfg(feature = "stream")]
            TransportConfig::Stream { bind } => {
                Ok(Self::Stream(StreamTransport::bind(bind).await?))
            }
            #[cfg(not(feature = "stream"))]
            TransportConfig::Stream { .. } => Err(TransportError::InvalidConfig(
                "stream transport not compiled in (enable the `stream` feature)".into(),
            )),
            TransportConfig::Datagram { bind } => Ok(Self::Datagram(
                DatagramTransport::bind(bind, max_frame_len).await?,
            )),
            TransportConfig::Group {
                group,
                port,
                interface,
            } => Ok(Self::Group(GroupTransport::bind(
                group,
                port,
                interface,
                max_frame_len,
            )?)),
        }
    }
}

impl Transport for AnyTransport {
    fn delivery(&self) -> Delivery {
        match self {
            #[cfg(feature = "stream")]
            Self::Stream(t) => t.delivery(),
            Self::Datagram(t) => t.delivery(),
            Self::Group(t) => t.delivery(),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        match self {
            #[cfg(feature = "stream")]
            Self::Stream(t) => t.local_addr(),
            Self::Datagram(t) => t.local_addr(),
            Self::Group(t) => t.local_addr(),
        }
    }

    async fn open(&self) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "stream")]
            Self::Stream(t) => t.open().await,
            Self::Datagram(t) => t.open().await,
            Self::Group(t) => t.open().await,
        }
    }

    async fn send(&self, to: &Endpoint, data: &[u8]) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "stream")]
            Self::Stream(t) => t.send(to, data).await,
            Self::Datagram(t) => t.send(to, data).await,
            Self::Group(t) => t.send(to, data).await,
        }
    }

    async fn recv(&self) -> Result<Incoming, TransportError> {
        match self {
            #[cfg(feature = "stream")]
            Self::Stream(t) => t.recv().await,
            Self::Datagram(t) => t.recv().await,
            Self::Group(t) => t.recv().await,
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "stream")]
            Self::Stream(t) => t.close().await,
            Self::Datagram(t) => t.close().await,
            Self::Group(t) => t.close().await,
        }
    }
}

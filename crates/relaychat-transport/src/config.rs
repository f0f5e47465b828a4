//! Transport selection and validation.

use std::net::{Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::TransportError;

/// Default listening port for the stream and datagram transports.
pub const DEFAULT_PORT: u16 = 9999;

/// Default multicast group.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(230, 0, 0, 0);

/// Default multicast port.
pub const DEFAULT_GROUP_PORT: u16 = 4446;

/// Which transport to run and where to bind it.
///
/// Serialized with an internal `mode` tag, e.g.
/// `{ "mode": "group", "group": "230.0.0.0", "port": 4446, "interface": "0.0.0.0" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Connection-oriented, one channel per peer.
    Stream { bind: SocketAddr },

    /// Connectionless, one shared socket.
    Datagram { bind: SocketAddr },

    /// Multicast group membership.
    Group {
        group: Ipv4Addr,
        port: u16,
        /// Outbound interface for multicast traffic. `0.0.0.0` lets the
        /// OS choose.
        interface: Ipv4Addr,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Stream {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
        }
    }
}

impl TransportConfig {
    /// Default multicast settings.
    pub fn default_group() -> Self {
        Self::Group {
            group: DEFAULT_GROUP,
            port: DEFAULT_GROUP_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }

    /// Checks the config before any socket is touched.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when a port is outside
    /// `1..=65535` or the group address is not an IPv4 multicast address.
    pub fn validate(&self) -> Result<(), TransportError> {
        let port = match self {
            Self::Stream { bind } | Self::Datagram { bind } => bind.port(),
            Self::Group { group, port, .. } => {
                if !group.is_multicast() {
                    return Err(TransportError::InvalidConfig(format!(
                        "{group} is not a multicast address (224.0.0.0/4)"
                    )));
                }
                *port
            }
        };
        if port == 0 {
            return Err(TransportError::InvalidConfig(
                "port must be in 1..=65535".into(),
            ));
        }
        Ok(())
    }

    /// Short name for logs and status details.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::Datagram { .. } => "datagram",
            Self::Group { .. } => "group",
        }
    }
}

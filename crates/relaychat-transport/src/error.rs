use crate::Endpoint;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The configuration was rejected before any socket was opened.
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    /// Binding the local socket or joining the multicast group failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// The peer behind an endpoint is no longer reachable.
    #[error("connection closed: {0}")]
    ConnectionClosed(Endpoint),

    /// This transport cannot address the given endpoint kind.
    #[error("endpoint {0} is not addressable on this transport")]
    UnsupportedEndpoint(Endpoint),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed. The owning receive loop cannot continue.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The transport was closed locally.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Returns `true` for the error every blocked call sees after `close()`.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

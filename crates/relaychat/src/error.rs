//! Unified error type for relaychat.

use relaychat_protocol::ProtocolError;
use relaychat_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` conversions let `?` lift sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A transport-level error (bind, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The relay configuration is unusable.
    #[error("invalid relay config: {0}")]
    InvalidConfig(String),

    /// The encoded frame is larger than the configured limit.
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// `start()` was called while a session is already running.
    #[error("relay is already running")]
    AlreadyRunning,

    /// An outbound send was attempted while the relay is stopped.
    #[error("relay is not running")]
    NotRunning,
}

impl RelayError {
    /// `true` for errors that mean `start()` could not bind or open.
    pub fn is_bind_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Bind(_) | TransportError::InvalidConfig(_))
                | Self::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::InvalidConfig("port 0".into());
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::Transport(_)));
        assert!(relay_err.to_string().contains("port 0"));
        assert!(relay_err.is_bind_error());
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::Protocol(_)));
        assert!(!relay_err.is_bind_error());
    }

    #[test]
    fn test_frame_too_large_display() {
        let err = RelayError::FrameTooLarge { len: 70_000, max: 65_535 };
        assert_eq!(err.to_string(), "frame of 70000 bytes exceeds the 65535-byte limit");
    }
}

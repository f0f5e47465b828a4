//! Error types for the protocol layer.
//!
//! Every codec reports failures through the same [`ProtocolError`], so the
//! receive loop can treat "this frame is garbage" uniformly no matter
//! which wire format is configured.

/// The underlying serializer's error, boxed so codecs can share variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] BoxError),

    /// Deserialization failed: malformed, truncated, or not a frame of
    /// this format at all.
    #[error("decode failed: {0}")]
    Decode(#[source] BoxError),

    /// The frame parsed but breaks a message rule, e.g. a `File` message
    /// without a payload or a `Text` message that also carries one.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

//! Codec trait and implementations for turning messages into frames.
//!
//! The router never looks at bytes; it hands a [`ChatMessage`] to whatever
//! [`Codec`] the relay was built with. [`JsonCodec`] is the default and
//! is what every transport speaks out of the box. [`BincodeCodec`] is a
//! compact binary alternative behind the `bincode` feature.

use serde::{Serialize, de::DeserializeOwned};

use crate::{ChatMessage, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `encode`/`decode` are generic over any serde type. The provided
/// `encode_message`/`decode_message` wrap them with the message body
/// rules, so a frame that parses but carries the wrong fields is still
/// rejected.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Validates and encodes one chat message.
    fn encode_message(&self, message: &ChatMessage) -> Result<Vec<u8>, ProtocolError> {
        message.validate()?;
        self.encode(message)
    }

    /// Decodes one frame and checks it is a well-formed chat message.
    fn decode_message(&self, data: &[u8]) -> Result<ChatMessage, ProtocolError> {
        let message: ChatMessage = self.decode(data)?;
        message.validate()?;
        Ok(message)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// File payloads travel as base64 text, so a frame is roughly four
/// thirds the size of the file it carries. Incoming frames must name
/// `kind` as their first field.
///
/// ```rust
/// use relaychat_protocol::{ChatMessage, Codec, JsonCodec, BROADCAST};
///
/// let codec = JsonCodec;
/// let message = ChatMessage::text("Alice", BROADCAST, "hi all");
///
/// let bytes = codec.encode_message(&message).unwrap();
/// let decoded = codec.decode_message(&bytes).unwrap();
/// assert_eq!(message, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(Box::new(e)))
    }

    fn decode_message(&self, data: &[u8]) -> Result<ChatMessage, ProtocolError> {
        let message: ChatMessage = self.decode(data)?;
        if !kind_comes_first(data) {
            return Err(ProtocolError::InvalidMessage(
                "frame does not start with its kind".into(),
            ));
        }
        message.validate()?;
        Ok(message)
    }
}

/// `true` if the JSON object's first key is `kind`.
#[cfg(feature = "json")]
fn kind_comes_first(data: &[u8]) -> bool {
    data.trim_ascii_start()
        .strip_prefix(b"{")
        .is_some_and(|rest| rest.trim_ascii_start().starts_with(b"\"kind\""))
}

// ---------------------------------------------------------------------------
// BincodeCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses `bincode`'s compact binary layout.
///
/// `limit` caps how many bytes a single decode may allocate, so a
/// corrupt length prefix cannot ask for gigabytes.
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy)]
pub struct BincodeCodec {
    limit: u64,
}

#[cfg(feature = "bincode")]
impl BincodeCodec {
    pub fn with_limit(limit: u64) -> Self {
        Self { limit }
    }

    fn options(&self) -> impl bincode::Options {
        use bincode::Options;
        bincode::options().with_limit(self.limit)
    }
}

#[cfg(feature = "bincode")]
impl Default for BincodeCodec {
    fn default() -> Self {
        Self::with_limit(65_535)
    }
}

#[cfg(feature = "bincode")]
impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        use bincode::Options;
        self.options()
            .serialize(value)
            .map_err(|e| ProtocolError::Encode(e))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        use bincode::Options;
        self.options()
            .deserialize(data)
            .map_err(|e| ProtocolError::Decode(e))
    }
}

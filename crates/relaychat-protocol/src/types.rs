//! The chat message model: the one unit that travels on the wire.
//!
//! A [`ChatMessage`] always names its [`MessageKind`] first, then who sent
//! it and who it is for, then exactly one body: `text` for `Text` and
//! `RosterUpdate`, `filename` + `payload` for `File`. The fields are
//! private so the only way to build a message is through a constructor
//! that fills the right body; [`ChatMessage::validate`] re-checks the rule
//! for frames that came off the network.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Target value meaning "every peer".
pub const BROADCAST: &str = "ALL";

/// Target value of the join handshake frame.
pub const HELLO: &str = "HELLO";

/// Target value of the explicit leave frame.
pub const BYE: &str = "BYE";

/// Separator used in roster payloads.
const ROSTER_SEPARATOR: char = ',';

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// A chat line (also used for the HELLO/BYE handshakes).
    Text,
    /// A named file or image as raw bytes.
    File,
    /// The comma-joined list of current nicknames.
    RosterUpdate,
}

/// One chat frame.
///
/// Field order matters for the wire: `kind` is serialized before any body
/// so a reader always knows what follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    kind: MessageKind,
    sender: String,
    target: String,
    /// Milliseconds since the Unix epoch when the message was built.
    /// Zero for frames from peers that do not stamp their messages.
    #[serde(default)]
    sent_at: u64,
    text: Option<String>,
    filename: Option<String>,
    #[serde(default, with = "payload_bytes")]
    payload: Option<Vec<u8>>,
}

impl ChatMessage {
    /// A chat line from `sender` to `target` (a nickname or [`BROADCAST`]).
    pub fn text(
        sender: impl Into<String>,
        target: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Text,
            sender: sender.into(),
            target: target.into(),
            sent_at: now_millis(),
            text: Some(text.into()),
            filename: None,
            payload: None,
        }
    }

    /// A file transfer. A zero-length payload is a valid (empty) file.
    pub fn file(
        sender: impl Into<String>,
        target: impl Into<String>,
        filename: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            kind: MessageKind::File,
            sender: sender.into(),
            target: target.into(),
            sent_at: now_millis(),
            text: None,
            filename: Some(filename.into()),
            payload: Some(payload),
        }
    }

    /// A roster broadcast. An empty roster is an empty string.
    pub fn roster<S: AsRef<str>>(sender: impl Into<String>, nicknames: &[S]) -> Self {
        let text = nicknames
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(&ROSTER_SEPARATOR.to_string());
        Self {
            kind: MessageKind::RosterUpdate,
            sender: sender.into(),
            target: BROADCAST.to_string(),
            sent_at: now_millis(),
            text: Some(text),
            filename: None,
            payload: None,
        }
    }

    /// The join handshake a peer sends right after connecting.
    pub fn hello(sender: impl Into<String>) -> Self {
        Self::text(sender, HELLO, HELLO.to_ascii_lowercase())
    }

    /// The explicit leave notification.
    pub fn bye(sender: impl Into<String>) -> Self {
        Self::text(sender, BYE, BYE.to_ascii_lowercase())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// When the sender built the message, by its wall clock. The Unix
    /// epoch if the sender did not say.
    pub fn sent_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.sent_at)
    }

    /// The text body (`Text` and `RosterUpdate` only).
    pub fn body_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// The file name (`File` only).
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The raw file bytes (`File` only).
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// `true` if the target is the broadcast sentinel. Matched without
    /// regard to case, as older clients send `all`.
    pub fn is_broadcast(&self) -> bool {
        self.target.eq_ignore_ascii_case(BROADCAST)
    }

    /// `true` for the join handshake frame.
    pub fn is_hello(&self) -> bool {
        self.kind == MessageKind::Text && self.target == HELLO
    }

    /// `true` for the explicit leave frame.
    pub fn is_bye(&self) -> bool {
        self.kind == MessageKind::Text && self.target == BYE
    }

    /// `true` if a participant named `nickname` should see this message.
    pub fn is_addressed_to(&self, nickname: &str) -> bool {
        self.is_broadcast() || self.target == nickname
    }

    /// The nicknames in a `RosterUpdate`, in the order they were sent.
    pub fn roster_names(&self) -> Option<Vec<String>> {
        if self.kind != MessageKind::RosterUpdate {
            return None;
        }
        let text = self.text.as_deref().unwrap_or_default();
        if text.is_empty() {
            return Some(Vec::new());
        }
        Some(text.split(ROSTER_SEPARATOR).map(str::to_string).collect())
    }

    /// Checks the body rule: exactly one of `text` or
    /// (`filename`, `payload`) is present, matching `kind`, and the
    /// sender is not empty.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] naming the broken rule.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.sender.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty sender".into()));
        }
        let has_text = self.text.is_some();
        let has_file = self.filename.is_some() || self.payload.is_some();
        let ok = match self.kind {
            MessageKind::Text | MessageKind::RosterUpdate => has_text && !has_file,
            MessageKind::File => {
                !has_text && self.filename.is_some() && self.payload.is_some()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ProtocolError::InvalidMessage(format!(
                "{:?} message with mismatched body fields",
                self.kind
            )))
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// File bytes as base64 text in human-readable formats, a plain byte
/// sequence in binary ones.
mod payload_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(
        payload: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match payload {
            Some(bytes) if serializer.is_human_readable() => {
                serializer.serialize_some(&STANDARD.encode(bytes))
            }
            other => other.serialize(serializer),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        if deserializer.is_human_readable() {
            Option::<String>::deserialize(deserializer)?
                .map(|text| STANDARD.decode(text).map_err(D::Error::custom))
                .transpose()
        } else {
            Option::<Vec<u8>>::deserialize(deserializer)
        }
    }
}

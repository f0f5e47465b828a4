//! Wire protocol for relaychat.
//!
//! This crate defines what peers say to each other:
//!
//! - **Types** ([`ChatMessage`], [`MessageKind`]): the one frame shape
//!   every transport carries, plus the `ALL`/`HELLO`/`BYE` target
//!   sentinels.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a message becomes
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! The protocol layer knows nothing about sockets or peers. It sits
//! between the transport and the router:
//!
//! ```text
//! Transport (bytes) → Protocol (ChatMessage) → Router (peers)
//! ```
//!
//! # Feature Flags
//!
//! - `json` (default): [`JsonCodec`] via `serde_json`
//! - `bincode`: `BincodeCodec`, a compact binary codec

mod codec;
mod error;
mod types;

#[cfg(feature = "bincode")]
pub use codec::BincodeCodec;
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{BoxError, ProtocolError};
pub use types::{BROADCAST, BYE, ChatMessage, HELLO, MessageKind};

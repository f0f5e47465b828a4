//! Peer registry for relaychat.
//!
//! Knows who is in the chat and how to reach them: a map from nickname to
//! transport [`Endpoint`](relaychat_transport::Endpoint), plus when each
//! peer was last heard from.
//!
//! # How it fits in the stack
//!
//! ```text
//! Router (above)     ← resolves targets, rebuilds the roster on join/leave
//!     ↕
//! Registry (this crate)
//!     ↕
//! Transport (below)  ← provides Endpoint
//! ```
//!
//! [`PeerRegistry`] is a plain single-owner structure. Callers that share
//! it between tasks wrap it in a mutex, so one lock acquisition covers
//! one logical operation and readers never see a half-applied change.

mod error;
mod peer;
mod registry;

pub use error::RegistryError;
pub use peer::{Peer, Presence};
pub use registry::PeerRegistry;

//! # relaychat
//!
//! A chat relay that speaks the same message model over three transports:
//! WebSocket streams, plain UDP datagrams, and UDP multicast groups.
//!
//! The layers, leaves first:
//!
//! ```text
//! relaychat-transport   bytes in, bytes out, per Endpoint
//! relaychat-protocol    ChatMessage <-> frame (Codec)
//! relaychat-registry    nickname -> Endpoint
//! relaychat             Router + Supervisor + event feed (this crate)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaychat::{ChatEvent, RelayConfig, Supervisor, TransportConfig};
//!
//! # async fn run() -> Result<(), relaychat::RelayError> {
//! let (relay, mut events) = Supervisor::builder().build();
//! relay
//!     .start(RelayConfig::new(TransportConfig::Datagram {
//!         bind: "0.0.0.0:9999".parse().unwrap(),
//!     }))
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ChatEvent::RosterChanged(names) = event {
//!         println!("online: {}", names.join(", "));
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `stream` (default): the WebSocket transport
//! - `bincode`: `BincodeCodec` as an alternative wire format

mod config;
mod error;
mod events;
mod router;
mod supervisor;

pub use config::{DEFAULT_MAX_FRAME_LEN, DEFAULT_NICKNAME, RelayConfig};
pub use error::RelayError;
pub use events::{ChatEvent, EventReceiver, EventSink, SessionState};
pub use router::Router;
pub use supervisor::{Supervisor, SupervisorBuilder};

pub use relaychat_protocol::{BROADCAST, ChatMessage, Codec, JsonCodec, MessageKind};
pub use relaychat_transport::{Endpoint, TransportConfig};

/// Installs a `tracing` subscriber that honours `RUST_LOG`, defaulting to
/// `info`. For binaries; calling it twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

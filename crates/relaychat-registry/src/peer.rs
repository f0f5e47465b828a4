//! Registry entries.

use std::time::{Duration, Instant};

use relaychat_transport::Endpoint;

/// A registered chat participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Unique key within the live registry.
    pub nickname: String,

    /// Where frames for this peer go. For datagram peers this follows the
    /// source address of their latest frame.
    pub endpoint: Endpoint,

    /// When the last frame from this peer was received. `Instant` is
    /// monotonic, so wall-clock jumps never evict anyone.
    pub last_seen: Instant,
}

impl Peer {
    pub(crate) fn new(nickname: String, endpoint: Endpoint) -> Self {
        Self {
            nickname,
            endpoint,
            last_seen: Instant::now(),
        }
    }

    /// How long since this peer last sent anything.
    pub fn idle(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// What [`register_or_update`](crate::PeerRegistry::register_or_update)
/// did with a nickname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The nickname was new. The roster changed.
    Joined,
    /// The nickname was known; endpoint and `last_seen` were refreshed.
    /// The roster did not change.
    Refreshed,
}

impl Presence {
    pub fn is_join(self) -> bool {
        matches!(self, Self::Joined)
    }
}

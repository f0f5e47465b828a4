//! The peer registry: the one place the peer set lives.
//!
//! Responsibilities:
//! - Registering peers on HELLO, refreshing them on every later frame
//! - Resolving a target nickname to an endpoint
//! - Removing peers on explicit leave or transport disconnect
//! - Evicting peers that have been silent for too long (optional)
//! - Producing a stable roster snapshot in join order
//!
//! # Concurrency note
//!
//! `PeerRegistry` is NOT thread-safe by itself. The router owns it behind
//! a `tokio::sync::Mutex`, which serializes every join, leave and lookup.

use std::collections::HashMap;
use std::time::Duration;

use relaychat_transport::Endpoint;

use crate::{Peer, Presence, RegistryError};

/// Maps nicknames to peers.
///
/// ```text
/// register_or_update() ──→ [registered] ──→ remove() / remove_endpoint()
///        ↑   │                   │
///        └───┘ (refresh)         └──→ expire_silent() (after ttl)
/// ```
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, Peer>,

    /// Nicknames in the order they joined. Kept in sync with `peers` so
    /// the roster comes out in a stable order.
    order: Vec<String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `nickname` at `endpoint`, or rebinds it if already known.
    ///
    /// A second join under a taken nickname does not create a second
    /// entry: the newest endpoint wins.
    pub fn register_or_update(&mut self, nickname: &str, endpoint: Endpoint) -> (Peer, Presence) {
        if let Some(peer) = self.peers.get_mut(nickname) {
            if peer.endpoint != endpoint {
                tracing::debug!(
                    nickname,
                    old = %peer.endpoint,
                    new = %endpoint,
                    "peer endpoint rebound"
                );
            }
            peer.endpoint = endpoint;
            peer.last_seen = std::time::Instant::now();
            return (peer.clone(), Presence::Refreshed);
        }

        let peer = Peer::new(nickname.to_string(), endpoint);
        self.peers.insert(nickname.to_string(), peer.clone());
        self.order.push(nickname.to_string());
        tracing::info!(nickname, %endpoint, "peer joined");
        (peer, Presence::Joined)
    }

    /// Refreshes a known peer's endpoint and `last_seen`.
    ///
    /// Returns `false` (and changes nothing) if the nickname is not
    /// registered; only a HELLO creates a peer.
    pub fn touch(&mut self, nickname: &str, endpoint: Endpoint) -> bool {
        match self.peers.get_mut(nickname) {
            Some(peer) => {
                peer.endpoint = endpoint;
                peer.last_seen = std::time::Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes a peer. Idempotent: returns `Some` only if it was present.
    pub fn remove(&mut self, nickname: &str) -> Option<Peer> {
        let peer = self.peers.remove(nickname)?;
        self.order.retain(|n| n != nickname);
        tracing::info!(nickname, "peer left");
        Some(peer)
    }

    /// Removes every peer bound to `endpoint` and returns their nicknames.
    ///
    /// Used when a stream connection drops: the transport only knows the
    /// connection, not who was speaking on it.
    pub fn remove_endpoint(&mut self, endpoint: &Endpoint) -> Vec<String> {
        let gone: Vec<String> = self
            .order
            .iter()
            .filter(|n| self.peers.get(*n).is_some_and(|p| p.endpoint == *endpoint))
            .cloned()
            .collect();
        for nickname in &gone {
            self.remove(nickname);
        }
        gone
    }

    /// Looks up a peer by nickname.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if nobody uses that nickname.
    pub fn resolve(&self, nickname: &str) -> Result<Peer, RegistryError> {
        self.peers
            .get(nickname)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(nickname.to_string()))
    }

    /// The current nicknames in join order, as an owned copy.
    pub fn snapshot(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Every registered peer in join order, as an owned copy.
    pub fn peers(&self) -> Vec<Peer> {
        self.order
            .iter()
            .filter_map(|n| self.peers.get(n).cloned())
            .collect()
    }

    /// Removes every peer that has been silent for at least `ttl` and
    /// returns their nicknames.
    ///
    /// Datagram peers have no disconnect event; call this periodically
    /// to drop the ones that went away without a BYE.
    pub fn expire_silent(&mut self, ttl: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .order
            .iter()
            .filter(|n| self.peers.get(*n).is_some_and(|p| p.idle() >= ttl))
            .cloned()
            .collect();
        for nickname in &stale {
            self.peers.remove(nickname);
            tracing::info!(nickname, ttl_secs = ttl.as_secs(), "peer evicted (silent)");
        }
        if !stale.is_empty() {
            self.order.retain(|n| self.peers.contains_key(n));
        }
        stale
    }

    /// Drops every peer without reporting anyone as having left.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.order.clear();
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.peers.contains_key(nickname)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

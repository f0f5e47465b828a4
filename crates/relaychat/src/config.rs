//! Relay configuration consumed by [`Supervisor::start`](crate::Supervisor::start).

use std::time::Duration;

use relaychat_protocol::{BROADCAST, BYE, HELLO};
use relaychat_transport::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::RelayError;

/// Default nickname of the local participant.
pub const DEFAULT_NICKNAME: &str = "Server";

/// Default upper bound on one encoded frame, in bytes. Also the size of
/// the datagram receive buffer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 65_535;

/// Everything [`Supervisor::start`](crate::Supervisor::start) needs.
///
/// Missing fields fall back to their defaults when deserializing, so a
/// config file only has to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// The local participant's nickname. Roster updates are sent under it.
    pub nickname: String,

    /// Which transport to bind, and where.
    pub transport: TransportConfig,

    /// Evict peers silent for this long. `None` keeps them until they
    /// leave or disconnect.
    pub peer_ttl: Option<Duration>,

    /// Largest encoded frame the relay will send.
    pub max_frame_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            nickname: DEFAULT_NICKNAME.to_string(),
            transport: TransportConfig::default(),
            peer_ttl: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl RelayConfig {
    /// A default config running `transport`.
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_peer_ttl(mut self, ttl: Duration) -> Self {
        self.peer_ttl = Some(ttl);
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Checks the config before anything is bound.
    ///
    /// # Errors
    /// [`RelayError::InvalidConfig`] for a blank or reserved nickname or a
    /// zero frame limit; [`RelayError::Transport`] if the transport config
    /// is rejected.
    pub fn validate(&self) -> Result<(), RelayError> {
        let nickname = self.nickname.trim();
        if nickname.is_empty() {
            return Err(RelayError::InvalidConfig("nickname must not be empty".into()));
        }
        if [BROADCAST, HELLO, BYE]
            .iter()
            .any(|reserved| nickname.eq_ignore_ascii_case(reserved))
        {
            return Err(RelayError::InvalidConfig(format!(
                "nickname {nickname:?} is reserved"
            )));
        }
        if self.max_frame_len == 0 {
            return Err(RelayError::InvalidConfig("max_frame_len must be positive".into()));
        }
        self.transport.validate()?;
        Ok(())
    }
}

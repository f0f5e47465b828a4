//! Error types for the registry.

/// Errors returned by [`PeerRegistry`](crate::PeerRegistry) lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No peer is registered under this nickname. Usually the target
    /// just left; the message is dropped rather than retried.
    #[error("no peer registered as {0:?}")]
    NotFound(String),
}

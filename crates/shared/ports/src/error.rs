use junction_core::{PeerId, PeerKind};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single call to a peer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// Network-level failure; retried with backoff
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Call exceeded its deadline; retried with backoff
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed or out-of-contract response; never retried
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{operation} is not supported by {kind} peers")]
    Unsupported {
        kind: PeerKind,
        operation: &'static str,
    },

    #[error("Peer {0} is offline")]
    Offline(PeerId),
}

impl PeerError {
    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PeerError::Transient(_) | PeerError::Timeout(_))
    }

    /// Whether this failure counts against the peer's health
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            PeerError::Transient(_) | PeerError::Timeout(_) | PeerError::Protocol(_)
        )
    }
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;

//! Peer registry
//!
//! Every peer of a run, in registration order. The order is the peer's
//! merge rank, so it must not change once the run starts.

use indexmap::IndexMap;
use junction_core::{Peer, PeerId, PeerKind};
use junction_merge::PeerRank;
use log::debug;

use crate::error::RegistryError;

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: IndexMap<PeerId, Peer>,
    frozen: bool,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer, returning its merge rank
    pub fn register(&mut self, peer: Peer) -> Result<PeerRank, RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen(peer.id));
        }
        if self.peers.contains_key(&peer.id) {
            return Err(RegistryError::DuplicatePeer(peer.id));
        }

        let rank = self.peers.len() as PeerRank;
        debug!("Registered {} peer {} (rank {})", peer.kind, peer.id, rank);
        self.peers.insert(peer.id.clone(), peer);
        Ok(rank)
    }

    pub fn resolve(&self, id: &PeerId) -> Result<&Peer, RegistryError> {
        self.peers
            .get(id)
            .ok_or_else(|| RegistryError::UnknownPeer(id.clone()))
    }

    pub fn rank_of(&self, id: &PeerId) -> Option<PeerRank> {
        self.peers.get_index_of(id).map(|i| i as PeerRank)
    }

    /// Stop accepting registrations
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Peers in rank order
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// First peer of the given kind, in rank order
    pub fn first_of(&self, kind: PeerKind) -> Option<&Peer> {
        self.iter().find(|p| p.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

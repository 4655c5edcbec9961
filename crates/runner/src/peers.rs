//! Guarded peers of a running simulation

use junction_core::{PeerId, PeerKind};
use junction_gateway::{GuardedPeer, HealthBoard};
use junction_merge::PeerRank;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{RegistryError, Result, RunError};

/// One peer as the scheduler sees it
#[derive(Clone)]
pub struct PeerEntry {
    pub guard: Arc<GuardedPeer>,
    pub rank: PeerRank,
    pub mandatory: bool,
}

impl PeerEntry {
    pub fn id(&self) -> &PeerId {
        self.guard.peer_id()
    }

    pub fn kind(&self) -> PeerKind {
        self.guard.kind()
    }

    pub fn is_offline(&self) -> bool {
        self.guard.is_offline()
    }
}

/// Every guarded peer of a run, in rank order
#[derive(Clone, Default)]
pub struct PeerSet {
    entries: Vec<PeerEntry>,
    health: HealthBoard,
}

impl PeerSet {
    pub fn new(health: HealthBoard) -> Self {
        Self {
            entries: Vec::new(),
            health,
        }
    }

    pub fn push(&mut self, entry: PeerEntry) {
        self.entries.push(entry);
        self.entries.sort_by_key(|e| e.rank);
    }

    pub fn health(&self) -> &HealthBoard {
        &self.health
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    /// Peers still reachable
    pub fn online(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter().filter(|e| !e.is_offline())
    }

    /// Peers the scheduler polls and advances, excluding offline ones
    pub fn scheduled(&self) -> impl Iterator<Item = &PeerEntry> {
        self.online().filter(|e| e.kind().is_scheduled())
    }

    /// First offline peer whose loss fails the run
    pub fn mandatory_offline(&self) -> Option<&PeerId> {
        self.entries
            .iter()
            .find(|e| e.mandatory && e.is_offline())
            .map(PeerEntry::id)
    }

    /// First reachable peer of a kind
    pub fn first_of(&self, kind: PeerKind) -> Option<&PeerEntry> {
        self.online().find(|e| e.kind() == kind)
    }

    /// Forward a route query to the planner
    ///
    /// Only touches the guarded peers, so it may run while a round is in
    /// flight.
    pub async fn plan(&self, query: &Value) -> Result<Value> {
        let planner = self
            .first_of(PeerKind::Planner)
            .ok_or(RunError::MissingPeer(PeerKind::Planner))?;
        Ok(planner.guard.plan(query).await?)
    }

    /// Ask a mobility peer whether it could serve a trip now
    pub async fn reservable(&self, service: &PeerId, org: &str, dst: &str) -> Result<bool> {
        let entry = self
            .get(service)
            .ok_or_else(|| RegistryError::UnknownPeer(service.clone()))?;
        Ok(entry.guard.reservable(org, dst).await?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

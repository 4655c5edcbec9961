//! Per-peer health board
//!
//! Written only by the guarded adapters, read by the scheduler and the
//! run report.

use dashmap::DashMap;
use junction_core::PeerId;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Health of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PeerHealth {
    #[default]
    Healthy,
    Degraded {
        consecutive_failures: u32,
    },
    /// Terminal for the rest of the run
    Offline,
}

impl PeerHealth {
    pub fn is_offline(&self) -> bool {
        matches!(self, PeerHealth::Offline)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, PeerHealth::Degraded { .. })
    }
}

/// Shared health board of one run
#[derive(Debug, Clone, Default)]
pub struct HealthBoard {
    peers: Arc<DashMap<PeerId, PeerHealth>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, peer: &PeerId) -> PeerHealth {
        self.peers.get(peer).map(|h| *h).unwrap_or_default()
    }

    pub fn is_offline(&self, peer: &PeerId) -> bool {
        self.get(peer).is_offline()
    }

    /// A call succeeded; clears the failure streak unless the peer is offline
    pub fn record_success(&self, peer: &PeerId) {
        let mut entry = self.peers.entry(peer.clone()).or_default();
        if entry.is_degraded() {
            info!("Peer {} recovered", peer);
            *entry = PeerHealth::Healthy;
        }
    }

    /// A call failed; returns the new health
    ///
    /// # Arguments
    /// * `peer` - Failing peer
    /// * `offline_after` - Consecutive failures that take the peer offline
    pub fn record_failure(&self, peer: &PeerId, offline_after: u32) -> PeerHealth {
        let mut entry = self.peers.entry(peer.clone()).or_default();
        let next = match *entry {
            PeerHealth::Offline => PeerHealth::Offline,
            PeerHealth::Healthy => PeerHealth::Degraded {
                consecutive_failures: 1,
            },
            PeerHealth::Degraded {
                consecutive_failures,
            } => PeerHealth::Degraded {
                consecutive_failures: consecutive_failures + 1,
            },
        };

        let next = match next {
            PeerHealth::Degraded {
                consecutive_failures,
            } if consecutive_failures >= offline_after => PeerHealth::Offline,
            other => other,
        };

        if next.is_offline() && !entry.is_offline() {
            warn!("Peer {} is now offline", peer);
        }
        *entry = next;
        next
    }

    pub fn mark_offline(&self, peer: &PeerId) {
        let mut entry = self.peers.entry(peer.clone()).or_default();
        if !entry.is_offline() {
            warn!("Peer {} marked offline", peer);
        }
        *entry = PeerHealth::Offline;
    }

    /// Every peer with a recorded health, sorted by id
    pub fn snapshot(&self) -> Vec<(PeerId, PeerHealth)> {
        let mut all: Vec<_> = self
            .peers
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn offline(&self) -> Vec<PeerId> {
        self.filtered(PeerHealth::is_offline)
    }

    pub fn degraded(&self) -> Vec<PeerId> {
        self.filtered(PeerHealth::is_degraded)
    }

    fn filtered(&self, keep: fn(&PeerHealth) -> bool) -> Vec<PeerId> {
        self.snapshot()
            .into_iter()
            .filter(|(_, health)| keep(health))
            .map(|(peer, _)| peer)
            .collect()
    }
}

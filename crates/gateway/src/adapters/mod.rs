//! Peer adapters
//!
//! One adapter per peer protocol. The scheduler only ever sees the
//! [`PeerAdapter`] port, so adding a mobility mode means adding an adapter
//! here, never a branch in the synchronization loop.

pub mod http;
pub mod planner;
pub mod scripted;
pub mod writer;

pub use http::HttpPeer;
pub use planner::PlannerPeer;
pub use scripted::{Call, Fault, Operation, ScriptedPeer};
pub use writer::WriterPeer;

use junction_core::{Peer, PeerKind};
use junction_ports::PeerAdapter;
use reqwest::Client;
use std::sync::Arc;

use crate::error::GatewayError;

/// Build the HTTP adapter for a configured peer
pub fn connect(peer: &Peer, client: &Client) -> Result<Arc<dyn PeerAdapter>, GatewayError> {
    let adapter: Arc<dyn PeerAdapter> = match peer.kind {
        PeerKind::HttpSimulator => Arc::new(HttpPeer::new(peer, client.clone())?),
        PeerKind::Planner => Arc::new(PlannerPeer::new(peer, client.clone())?),
        PeerKind::BrokerWriter => Arc::new(WriterPeer::new(peer, client.clone())?),
    };
    Ok(adapter)
}

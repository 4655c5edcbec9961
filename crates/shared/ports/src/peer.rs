use async_trait::async_trait;
use junction_core::{Event, PeerId, PeerKind, ReservationAnswer, ReservationRequest, SimTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PeerError, PeerResult};

/// Outcome of delivering one merged event to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason", rename_all = "lowercase")]
pub enum Delivery {
    Ack,
    /// The peer refused the event; not a peer failure
    Nack(String),
}

impl Delivery {
    pub fn is_ack(&self) -> bool {
        matches!(self, Delivery::Ack)
    }
}

/// Port for one peer of the simulation
///
/// Every peer kind exposes the same capability set so the scheduler never
/// branches on the protocol behind it. New mobility modes are added by
/// implementing this trait.
///
/// Calls on a single adapter are the broker's only suspension points.
#[async_trait]
pub trait PeerAdapter: Send + Sync {
    fn peer_id(&self) -> &PeerId;

    fn kind(&self) -> PeerKind;

    /// Liveness probe, handing the peer its opaque setup details
    async fn probe(&self) -> PeerResult<()>;

    /// Next time the peer wants to act, or None when it is quiescent
    async fn peek_next_event_time(&self) -> PeerResult<Option<SimTime>>;

    /// Let the peer process everything up to and including `time`
    ///
    /// Must be idempotent for a repeated `time`.
    async fn advance_to(&self, time: SimTime) -> PeerResult<Vec<Event>>;

    /// Hand one merged event to the peer
    async fn deliver(&self, event: &Event) -> PeerResult<Delivery>;

    /// Ask the peer to book a resource; only mobility peers answer
    async fn reserve(&self, request: &ReservationRequest) -> PeerResult<ReservationAnswer> {
        let _ = request;
        Err(PeerError::Unsupported {
            kind: self.kind(),
            operation: "reserve",
        })
    }

    /// Whether the peer could serve a trip between two locations right now
    async fn reservable(&self, org: &str, dst: &str) -> PeerResult<bool> {
        let _ = (org, dst);
        Err(PeerError::Unsupported {
            kind: self.kind(),
            operation: "reservable",
        })
    }

    /// Route planning query; only planner peers answer
    async fn plan(&self, query: &Value) -> PeerResult<Value> {
        let _ = query;
        Err(PeerError::Unsupported {
            kind: self.kind(),
            operation: "plan",
        })
    }

    /// Called once a round's events have all been delivered
    async fn flush(&self) -> PeerResult<()> {
        Ok(())
    }

    /// Notify the peer that the event stream is closed
    async fn finish(&self) -> PeerResult<()> {
        Ok(())
    }
}

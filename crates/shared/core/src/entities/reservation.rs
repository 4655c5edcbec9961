use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::{Event, PeerId};
use crate::values::{SimTime, TimeWindow};

/// Unique identifier for a reservation
pub type ReservationId = Uuid;

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Forwarded to the mobility peer, answer pending
    Requested,
    Confirmed,
    Rejected,
    /// Confirmed booking later withdrawn by the commuter
    Cancelled,
}

impl ReservationStatus {
    /// Returns true if no further transition is expected from this status
    ///
    /// `Confirmed` counts as terminal for the request itself even though a
    /// later cancellation may still move it to `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Requested)
    }

    /// The only edges are `requested → confirmed | rejected` and `confirmed → cancelled`
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (
                ReservationStatus::Requested,
                ReservationStatus::Confirmed | ReservationStatus::Rejected
            ) | (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
        )
    }
}

/// Malformed reservation-shaped event payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Reservation request has no target mobility peer")]
    MissingTarget,

    #[error("Dropoff precedes pickup")]
    InvalidWindow,
}

/// Booking request forwarded to the owning mobility peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub commuter_id: String,
    pub demand_id: String,
    pub mobility_peer_id: PeerId,
    pub resource_hint: Option<String>,
    pub window: TimeWindow,
    /// Remaining request details (origin, destination, ...) passed through untouched
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ReservationRequest {
    /// Extract a request from a `RESERVE` event
    ///
    /// Pickup defaults to the event time, dropoff to the pickup.
    pub fn from_event(event: &Event) -> Result<Self, PayloadError> {
        let mobility_peer_id = event.target.clone().ok_or(PayloadError::MissingTarget)?;
        let (commuter_id, demand_id) = demand_key(event)?;

        let pickup = event.field_time("dept").unwrap_or(event.time);
        let dropoff = event.field_time("arrv").unwrap_or(pickup);
        let window = TimeWindow::new(pickup, dropoff).ok_or(PayloadError::InvalidWindow)?;

        Ok(Self {
            commuter_id,
            demand_id,
            mobility_peer_id,
            resource_hint: event.field_str("resourceHint").map(str::to_string),
            window,
            details: event.payload.clone(),
        })
    }
}

/// `(commuter, demand)` pair identifying the booking an event refers to
pub fn demand_key(event: &Event) -> Result<(String, String), PayloadError> {
    let commuter = event
        .field_str("userId")
        .ok_or(PayloadError::MissingField("userId"))?;
    let demand = event
        .field_str("demandId")
        .ok_or(PayloadError::MissingField("demandId"))?;
    Ok((commuter.to_string(), demand.to_string()))
}

/// Status half of a mobility peer's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Confirmed,
    Rejected,
}

/// The mobility peer's authoritative answer to a booking request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationAnswer {
    pub status: AnswerStatus,
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Window actually granted; the requested one when absent
    #[serde(default)]
    pub window: Option<TimeWindow>,
}

impl ReservationAnswer {
    pub fn confirmed(resource_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            status: AnswerStatus::Confirmed,
            resource_id: Some(resource_id.into()),
            window: Some(window),
        }
    }

    pub fn rejected() -> Self {
        Self {
            status: AnswerStatus::Rejected,
            resource_id: None,
            window: None,
        }
    }
}

/// A commuter's claim on a mobility resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub commuter_id: String,
    pub demand_id: String,
    /// Demand-side peer that issued the request
    pub requested_by: PeerId,
    pub mobility_peer_id: PeerId,
    /// Assigned by the mobility peer on confirmation
    pub resource_id: Option<String>,
    pub window: TimeWindow,
    pub status: ReservationStatus,
    /// Broker-wide request order, used to settle conflicts
    pub request_seq: u64,
    pub requested_at: SimTime,
    pub reason: Option<String>,
}

impl Reservation {
    pub fn requested(
        request: &ReservationRequest,
        requested_by: PeerId,
        request_seq: u64,
        requested_at: SimTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            commuter_id: request.commuter_id.clone(),
            demand_id: request.demand_id.clone(),
            requested_by,
            mobility_peer_id: request.mobility_peer_id.clone(),
            resource_id: request.resource_hint.clone(),
            window: request.window,
            status: ReservationStatus::Requested,
            request_seq,
            requested_at,
            reason: None,
        }
    }

    /// Whether this booking holds the same resource as `other` for an overlapping window
    pub fn collides_with(&self, other: &Reservation) -> bool {
        self.mobility_peer_id == other.mobility_peer_id
            && self.resource_id.is_some()
            && self.resource_id == other.resource_id
            && self.window.overlaps(&other.window)
    }
}

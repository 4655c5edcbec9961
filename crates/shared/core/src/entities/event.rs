use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::PeerId;
use crate::values::SimTime;

/// Event type, using the wire names shared by all peers
///
/// Unknown names are carried through untouched so new mobility modes can
/// introduce event types without a broker release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Demand,
    /// Reservation request from a demand-side peer (`RESERVE`)
    ReservationRequest,
    /// Outcome of a reservation request (`RESERVED`)
    ReservationResult,
    /// Request to depart on a confirmed reservation
    DepartRequest,
    /// Departure (`DEPARTED`)
    Departure,
    /// Arrival (`ARRIVED`)
    Arrival,
    Cancellation,
    AvailabilityUpdate,
    /// Broker notice that a previously confirmed booking lost a conflict
    ReservationCorrection,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Demand => "DEMAND",
            EventKind::ReservationRequest => "RESERVE",
            EventKind::ReservationResult => "RESERVED",
            EventKind::DepartRequest => "DEPART",
            EventKind::Departure => "DEPARTED",
            EventKind::Arrival => "ARRIVED",
            EventKind::Cancellation => "CANCEL",
            EventKind::AvailabilityUpdate => "AVAILABILITY",
            EventKind::ReservationCorrection => "RESERVATION_CORRECTION",
            EventKind::Other(name) => name,
        }
    }

    /// Whether the reservation coordinator must see this event before it is final
    pub fn is_reservation_shaped(&self) -> bool {
        matches!(
            self,
            EventKind::ReservationRequest | EventKind::Cancellation
        )
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "DEMAND" => EventKind::Demand,
            "RESERVE" => EventKind::ReservationRequest,
            "RESERVED" => EventKind::ReservationResult,
            "DEPART" => EventKind::DepartRequest,
            "DEPARTED" => EventKind::Departure,
            "ARRIVED" => EventKind::Arrival,
            "CANCEL" => EventKind::Cancellation,
            "AVAILABILITY" => EventKind::AvailabilityUpdate,
            "RESERVATION_CORRECTION" => EventKind::ReservationCorrection,
            _ => EventKind::Other(name),
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        EventKind::from(name.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped occurrence emitted by a peer (or by the broker itself)
///
/// Field names follow the event log format consumed by writers and evaluators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: SimTime,
    pub source: PeerId,
    #[serde(rename = "eventType")]
    pub kind: EventKind,
    /// Single recipient; broadcast when absent
    #[serde(rename = "service", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PeerId>,
    #[serde(rename = "details", default)]
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(
        time: SimTime,
        source: impl Into<PeerId>,
        kind: EventKind,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            time,
            source: source.into(),
            kind,
            target: None,
            payload,
        }
    }

    pub fn with_target(mut self, target: impl Into<PeerId>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// String field of the payload, if present
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Numeric field of the payload, if present and finite
    pub fn field_time(&self, key: &str) -> Option<SimTime> {
        self.payload
            .get(key)
            .and_then(Value::as_f64)
            .and_then(SimTime::new)
    }

    /// Whether `peer` should receive this event when it is delivered downstream
    pub fn is_addressed_to(&self, peer: &PeerId) -> bool {
        match &self.target {
            Some(target) => target == peer,
            None => &self.source != peer,
        }
    }
}

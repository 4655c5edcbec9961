//! Synchronization messages (`/peek`, `/advance`)

use junction_core::{Event, EventKind, PeerId, SimTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// `GET /peek` response
///
/// Older peers answer `{"next": -1}` when idle; both spellings are accepted
/// and any negative time means "nothing pending".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeekResponse {
    #[serde(alias = "next", default)]
    pub next_time: Option<f64>,
}

impl PeekResponse {
    pub fn idle() -> Self {
        Self { next_time: None }
    }

    pub fn at(time: SimTime) -> Self {
        Self {
            next_time: Some(time.minutes()),
        }
    }

    pub fn into_time(self) -> Result<Option<SimTime>, GatewayError> {
        match self.next_time {
            None => Ok(None),
            Some(t) if t < 0.0 => Ok(None),
            Some(t) => SimTime::new(t)
                .map(Some)
                .ok_or_else(|| GatewayError::Contract(format!("non-finite next time {}", t))),
        }
    }
}

/// `POST /advance` body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub time: SimTime,
}

/// One event as a peer reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Stamped with the advance target when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(rename = "eventType", alias = "kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(rename = "details", alias = "payload", default)]
    pub details: Map<String, Value>,
}

impl WireEvent {
    /// Convert into a domain event emitted by `source` during `advance_to(target)`
    ///
    /// Events claiming a time past the advance target break the peer
    /// contract: the peer was never allowed to get there.
    pub fn into_event(self, source: &PeerId, target: SimTime) -> Result<Event, GatewayError> {
        let time = match self.time {
            None => target,
            Some(raw) => SimTime::new(raw).ok_or_else(|| {
                GatewayError::Contract(format!("non-finite event time {}", raw))
            })?,
        };
        if time > target {
            return Err(GatewayError::Contract(format!(
                "{} event at {} beyond advance target {}",
                self.kind, time, target
            )));
        }

        let mut event = Event::new(time, source.clone(), EventKind::from(self.kind), self.details);
        event.target = self.service.map(PeerId::from);
        Ok(event)
    }
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        Self {
            time: Some(event.time.minutes()),
            kind: event.kind.to_string(),
            service: event.target.as_ref().map(ToString::to_string),
            details: event.payload.clone(),
        }
    }
}

/// `POST /advance` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvanceResponse {
    #[serde(default)]
    pub events: Vec<WireEvent>,
}

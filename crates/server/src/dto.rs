//! Request and response bodies of the control API

use junction_core::{PeerId, RunId, SimTime};
use junction_merge::MergedEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub msg: String,
}

impl ErrorResponse {
    pub fn new(code: i32, msg: impl Into<String>) -> Self {
        ErrorResponse {
            code,
            msg: msg.into(),
        }
    }
}

/// Returned once scenario settings have been accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupResponse {
    pub run_id: RunId,
    /// Configured peers in merge-rank order
    pub peers: Vec<PeerId>,
}

/// Next round time, or -1 when nothing is pending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeekResponse {
    pub next_time: f64,
}

impl PeekResponse {
    pub fn from_peek(next: Option<SimTime>) -> Self {
        PeekResponse {
            next_time: next.map(SimTime::minutes).unwrap_or(-1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResponse {
    /// True once the run has been flushed to the horizon
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<SimTime>,
    /// Events released by this call, in merge order
    pub events: Vec<MergedEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunQuery {
    pub until: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run_id: RunId,
    pub until: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    /// First sequence number to return
    #[serde(default)]
    pub since: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservableQuery {
    pub service: Option<String>,
    pub org: Option<String>,
    pub dst: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservableResponse {
    pub service: PeerId,
    pub reservable: bool,
}

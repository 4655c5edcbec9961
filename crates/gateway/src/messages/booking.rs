//! Reservation messages (`/reservations`, `/reservable`)

use junction_core::{ReservationRequest, TimeWindow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `POST /reservations` body
///
/// The answer is a [`ReservationAnswer`](junction_core::ReservationAnswer),
/// whose wire form is already stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub commuter_id: String,
    pub demand_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_hint: Option<String>,
    pub window: TimeWindow,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl From<&ReservationRequest> for BookingRequest {
    fn from(request: &ReservationRequest) -> Self {
        Self {
            commuter_id: request.commuter_id.clone(),
            demand_id: request.demand_id.clone(),
            resource_hint: request.resource_hint.clone(),
            window: request.window,
            details: request.details.clone(),
        }
    }
}

/// `GET /reservable` response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservableResponse {
    pub reservable: bool,
}

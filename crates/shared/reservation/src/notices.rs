use junction_core::{Event, EventKind, PeerId, Reservation, ReservationStatus, SimTime};
use serde_json::{Map, Value, json};

use crate::coordinator::Conflict;

/// `RESERVED` event telling the requesting peer how its booking ended
pub fn result_event(reservation: &Reservation, at: SimTime) -> Event {
    let mut payload = Map::new();
    payload.insert("userId".into(), json!(reservation.commuter_id));
    payload.insert("demandId".into(), json!(reservation.demand_id));
    payload.insert("mobility".into(), json!(reservation.mobility_peer_id));
    payload.insert("reservationId".into(), json!(reservation.id));
    payload.insert(
        "success".into(),
        json!(matches!(
            reservation.status,
            ReservationStatus::Confirmed | ReservationStatus::Cancelled
        )),
    );
    payload.insert("status".into(), json!(reservation.status));
    payload.insert("dept".into(), json!(reservation.window.pickup));
    payload.insert("arrv".into(), json!(reservation.window.dropoff));
    if let Some(resource) = &reservation.resource_id {
        payload.insert("resourceId".into(), json!(resource));
    }
    if let Some(reason) = &reservation.reason {
        payload.insert("reason".into(), Value::String(reason.clone()));
    }

    Event::new(at, PeerId::broker(), EventKind::ReservationResult, payload)
        .with_target(reservation.requested_by.clone())
}

/// Correction sent to the losing commuter's demand-side peer so it can re-plan
pub fn correction_event(conflict: &Conflict, at: SimTime) -> Event {
    let mut payload = Map::new();
    payload.insert("userId".into(), json!(conflict.commuter_id));
    payload.insert("demandId".into(), json!(conflict.demand_id));
    payload.insert("mobility".into(), json!(conflict.mobility_peer_id));
    payload.insert("reservationId".into(), json!(conflict.rejected));
    payload.insert("resourceId".into(), json!(conflict.resource_id));
    payload.insert("heldBy".into(), json!(conflict.holder));
    payload.insert("reason".into(), json!("resource-conflict"));

    Event::new(at, PeerId::broker(), EventKind::ReservationCorrection, payload)
        .with_target(conflict.requested_by.clone())
}

/// `RESERVED` failure telling the mobility peer to release the resource it
/// confirmed for the rejected booking
pub fn void_event(conflict: &Conflict, at: SimTime) -> Event {
    let mut payload = Map::new();
    payload.insert("userId".into(), json!(conflict.commuter_id));
    payload.insert("demandId".into(), json!(conflict.demand_id));
    payload.insert("mobility".into(), json!(conflict.mobility_peer_id));
    payload.insert("reservationId".into(), json!(conflict.rejected));
    payload.insert("success".into(), json!(false));
    payload.insert("status".into(), json!(ReservationStatus::Rejected));
    payload.insert("dept".into(), json!(conflict.window.pickup));
    payload.insert("arrv".into(), json!(conflict.window.dropoff));
    payload.insert("resourceId".into(), json!(conflict.resource_id));
    payload.insert("reason".into(), json!("resource-conflict"));

    Event::new(at, PeerId::broker(), EventKind::ReservationResult, payload)
        .with_target(conflict.mobility_peer_id.clone())
}

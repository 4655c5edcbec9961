//! Booking requests of one closed round
//!
//! `RESERVE` events are opened with the coordinator in merge order, the
//! owning mobility peers are asked concurrently, and the answers are
//! decided back in merge order so the earlier request always wins a
//! conflict.

use futures_util::future::join_all;
use junction_core::{
    Event, EventKind, PeerKind, ReservationId, ReservationRequest, SimTime, demand_key,
};
use junction_ports::PeerResult;
use junction_reservation::{
    CancelOutcome, Decision, ReservationCoordinator, correction_event, result_event,
    void_event,
};
use log::{debug, warn};

use crate::peers::PeerSet;

/// Reason recorded when the mobility peer could not be asked
pub const PEER_UNAVAILABLE: &str = "peer-unavailable";

/// Route the round's booking traffic, returning the broker's notices
///
/// # Arguments
/// * `coordinator` - Run-wide reservation table
/// * `peers` - Guarded peers of the run
/// * `events` - The closed round's merged events
/// * `at` - Round time, stamped on every notice
pub async fn route_round(
    coordinator: &mut ReservationCoordinator,
    peers: &PeerSet,
    events: &[Event],
    at: SimTime,
) -> Vec<Event> {
    let mut notices = Vec::new();

    let mut opened: Vec<(ReservationId, ReservationRequest)> = Vec::new();
    for event in events.iter().filter(|e| e.kind == EventKind::ReservationRequest) {
        match ReservationRequest::from_event(event) {
            Ok(request) => {
                let id = coordinator.open(&request, event.source.clone(), at);
                opened.push((id, request));
            }
            Err(e) => warn!("Skipping malformed RESERVE from {}: {}", event.source, e),
        }
    }

    for event in events.iter().filter(|e| e.kind == EventKind::Cancellation) {
        let (commuter, demand) = match demand_key(event) {
            Ok(key) => key,
            Err(e) => {
                warn!("Skipping malformed CANCEL from {}: {}", event.source, e);
                continue;
            }
        };
        match coordinator.cancel(&commuter, &demand) {
            CancelOutcome::Applied(reservation) => notices.push(result_event(&reservation, at)),
            CancelOutcome::Deferred(id) => debug!("Cancel of {} waits for its decision", id),
            CancelOutcome::Unknown => debug!("Cancel for unknown booking {}/{}", commuter, demand),
            CancelOutcome::Stale(status) => {
                debug!("Cancel for {}/{} ignored, booking is {:?}", commuter, demand, status)
            }
        }
    }

    if opened.is_empty() {
        return notices;
    }

    let answers = join_all(opened.iter().map(|(_, request)| ask(peers, request))).await;

    for ((id, request), answer) in opened.iter().zip(answers) {
        let decided = match answer {
            Some(Ok(answer)) => coordinator.decide(*id, &answer),
            Some(Err(e)) => {
                warn!("{} could not answer booking {}: {}", request.mobility_peer_id, id, e);
                coordinator.reject(*id, PEER_UNAVAILABLE)
            }
            None => {
                warn!("Booking {} names unavailable peer {}", id, request.mobility_peer_id);
                coordinator.reject(*id, PEER_UNAVAILABLE)
            }
        };

        match decided {
            Ok(Decision {
                reservation,
                conflict,
                ..
            }) => {
                notices.push(result_event(&reservation, at));
                if let Some(conflict) = conflict {
                    notices.push(correction_event(&conflict, at));
                    notices.push(void_event(&conflict, at));
                }
            }
            Err(e) => warn!("Booking {} left undecided: {}", id, e),
        }
    }

    notices
}

/// Ask the owning mobility peer; None when it is unknown or offline
async fn ask(
    peers: &PeerSet,
    request: &ReservationRequest,
) -> Option<PeerResult<junction_core::ReservationAnswer>> {
    let entry = peers
        .get(&request.mobility_peer_id)
        .filter(|e| e.kind() == PeerKind::HttpSimulator && !e.is_offline())?;
    Some(entry.guard.reserve(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::PeerEntry;
    use junction_core::{PeerId, ReservationAnswer, ReservationStatus};
    use junction_gateway::{Fault, GuardedPeer, HealthBoard, Operation, RetryPolicy, ScriptedPeer};
    use junction_ports::PeerError;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn t(v: f64) -> SimTime {
        SimTime::new(v).unwrap()
    }

    fn peers(mobility: ScriptedPeer) -> PeerSet {
        let health = HealthBoard::new();
        let mut peers = PeerSet::new(health.clone());
        let policy = RetryPolicy {
            max_attempts: 1,
            jitter: false,
            ..RetryPolicy::default()
        };
        for (rank, adapter) in [ScriptedPeer::new("user"), mobility].into_iter().enumerate() {
            peers.push(PeerEntry {
                guard: Arc::new(GuardedPeer::new(
                    Arc::new(adapter),
                    policy.clone(),
                    3,
                    health.clone(),
                )),
                rank: rank as u32,
                mandatory: true,
            });
        }
        peers
    }

    fn reserve(commuter: &str, details: Value) -> Event {
        let mut payload = json!({"userId": commuter, "demandId": "D1"});
        if let (Some(base), Value::Object(extra)) = (payload.as_object_mut(), details) {
            base.extend(extra);
        }
        let payload = payload.as_object().cloned().unwrap_or_default();
        Event::new(t(5.0), "user", EventKind::ReservationRequest, payload).with_target("ondemand")
    }

    #[tokio::test]
    async fn test_confirmed_booking_notifies_requester() {
        let peers = peers(ScriptedPeer::new("ondemand"));
        let mut coordinator = ReservationCoordinator::new();

        let notices = route_round(
            &mut coordinator,
            &peers,
            &[reserve("U1", json!({"dept": 10, "arrv": 20}))],
            t(5.0),
        )
        .await;

        assert_eq!(notices.len(), 1);
        let notice = &notices[0];
        assert_eq!(notice.kind, EventKind::ReservationResult);
        assert_eq!(notice.source, PeerId::broker());
        assert_eq!(notice.target, Some(PeerId::from("user")));
        assert_eq!(notice.payload["success"], true);
        assert_eq!(notice.payload["resourceId"], "vehicle-U1");
        assert_eq!(coordinator.pending().count(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_bookings_earlier_wins() {
        let mobility = ScriptedPeer::new("ondemand")
            .with_answers(|request| ReservationAnswer::confirmed("car-1", request.window));
        let peers = peers(mobility);
        let mut coordinator = ReservationCoordinator::new();

        let notices = route_round(
            &mut coordinator,
            &peers,
            &[
                reserve("U1", json!({"dept": 10, "arrv": 20})),
                reserve("U2", json!({"dept": 15, "arrv": 25})),
            ],
            t(5.0),
        )
        .await;

        let kinds: Vec<_> = notices.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ReservationResult,
                EventKind::ReservationResult,
                EventKind::ReservationCorrection,
                EventKind::ReservationResult
            ]
        );
        assert_eq!(notices[0].payload["userId"], "U1");
        assert_eq!(notices[0].payload["success"], true);
        assert_eq!(notices[1].payload["userId"], "U2");
        assert_eq!(notices[1].payload["success"], false);
        assert_eq!(notices[2].payload["reason"], "resource-conflict");
        // the mobility peer confirmed car-1 twice and must free the second
        assert_eq!(notices[3].target, Some(PeerId::from("ondemand")));
        assert_eq!(notices[3].payload["userId"], "U2");
        assert_eq!(notices[3].payload["success"], false);
        assert_eq!(coordinator.conflicts().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_peer_rejects_booking() {
        let mobility = ScriptedPeer::new("ondemand").with_faults(
            Operation::Reserve,
            1,
            Fault::Fail(PeerError::Protocol("bad body".into())),
        );
        let peers = peers(mobility);
        let mut coordinator = ReservationCoordinator::new();

        let notices =
            route_round(&mut coordinator, &peers, &[reserve("U1", json!({}))], t(5.0)).await;

        assert_eq!(notices[0].payload["success"], false);
        assert_eq!(notices[0].payload["reason"], PEER_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cancel_in_same_round_is_replayed() {
        let peers = peers(ScriptedPeer::new("ondemand"));
        let mut coordinator = ReservationCoordinator::new();

        let cancel = Event::new(
            t(5.0),
            "user",
            EventKind::Cancellation,
            json!({"userId": "U1", "demandId": "D1"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .with_target("ondemand");

        let notices = route_round(
            &mut coordinator,
            &peers,
            &[reserve("U1", json!({})), cancel.clone()],
            t(5.0),
        )
        .await;

        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].payload["status"], "cancelled");

        // a later cancel of the same booking is stale
        let again = route_round(&mut coordinator, &peers, &[cancel], t(6.0)).await;
        assert!(again.is_empty());
        assert_eq!(
            coordinator.iter().next().map(|r| r.status),
            Some(ReservationStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_peer() {
        let peers = peers(ScriptedPeer::new("ondemand"));
        let mut coordinator = ReservationCoordinator::new();

        let no_user = Event::new(t(5.0), "user", EventKind::ReservationRequest, Default::default())
            .with_target("ondemand");
        let elsewhere = reserve("U3", json!({})).with_target("bikeshare");

        let notices =
            route_round(&mut coordinator, &peers, &[no_user, elsewhere], t(5.0)).await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].payload["reason"], PEER_UNAVAILABLE);
        assert_eq!(coordinator.len(), 1);
    }
}

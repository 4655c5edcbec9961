use junction_core::{
    AnswerStatus, PeerId, Reservation, ReservationAnswer, ReservationId, ReservationRequest,
    ReservationStatus, SimTime, TimeWindow,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{ReservationError, ReservationResult};

/// Reason recorded when the owning mobility peer turned a request down
const REJECTED_BY_PEER: &str = "rejected-by-peer";

/// A double booking observed on confirmation and settled by request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Earlier-requested booking, kept
    pub holder: ReservationId,
    /// Later-requested booking, rejected
    pub rejected: ReservationId,
    pub mobility_peer_id: PeerId,
    pub resource_id: String,
    pub window: TimeWindow,
    /// Commuter and demand of the rejected booking
    pub commuter_id: String,
    pub demand_id: String,
    /// Demand-side peer that must re-plan
    pub requested_by: PeerId,
}

/// Result of deciding one request
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Final state of the reservation after the decision and any replayed cancellation
    pub reservation: Reservation,
    pub conflict: Option<Conflict>,
    /// A cancellation queued while the request was pending was applied
    pub replayed_cancel: bool,
}

/// Result of a cancellation event
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The confirmed booking is now cancelled
    Applied(Reservation),
    /// The request is still pending; the cancellation replays after the decision
    Deferred(ReservationId),
    /// No booking exists for the commuter's demand
    Unknown,
    /// The booking already reached a status that cannot be cancelled
    Stale(ReservationStatus),
}

/// Reservation table of one run
///
/// Decisions must be applied in request order: a request may only be
/// decided once every earlier request has been. This is what makes
/// "earliest request wins" deterministic.
#[derive(Debug, Default)]
pub struct ReservationCoordinator {
    reservations: Vec<Reservation>,
    by_id: HashMap<ReservationId, usize>,
    /// Latest booking per (commuter, demand)
    by_demand: HashMap<(String, String), usize>,
    /// Requested bookings keyed by request sequence
    pending: BTreeMap<u64, usize>,
    deferred_cancels: BTreeSet<ReservationId>,
    conflicts: Vec<Conflict>,
    next_seq: u64,
}

impl ReservationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new booking request in `requested` status
    ///
    /// # Arguments
    /// * `request` - Parsed reservation request
    /// * `requested_by` - Demand-side peer that emitted it
    /// * `at` - Simulation time of the request
    pub fn open(
        &mut self,
        request: &ReservationRequest,
        requested_by: PeerId,
        at: SimTime,
    ) -> ReservationId {
        let seq = self.next_seq;
        self.next_seq += 1;

        let reservation = Reservation::requested(request, requested_by, seq, at);
        let id = reservation.id;
        let index = self.reservations.len();

        debug!(
            "Reservation {} requested: {}/{} on {} {:?}",
            id, reservation.commuter_id, reservation.demand_id, reservation.mobility_peer_id, reservation.window
        );

        self.by_id.insert(id, index);
        self.by_demand.insert(
            (reservation.commuter_id.clone(), reservation.demand_id.clone()),
            index,
        );
        self.pending.insert(seq, index);
        self.reservations.push(reservation);
        id
    }

    /// Apply the mobility peer's answer to a pending request
    ///
    /// A confirmation that overlaps an existing confirmed booking on the
    /// same resource is turned into a rejection and reported as a conflict.
    pub fn decide(
        &mut self,
        id: ReservationId,
        answer: &ReservationAnswer,
    ) -> ReservationResult<Decision> {
        let index = self.pending_index(id)?;

        if answer.status == AnswerStatus::Rejected {
            return self.settle(index, ReservationStatus::Rejected, Some(REJECTED_BY_PEER.into()));
        }

        let candidate = &mut self.reservations[index];
        if let Some(resource) = &answer.resource_id {
            candidate.resource_id = Some(resource.clone());
        }
        if let Some(window) = answer.window {
            candidate.window = window;
        }

        let Some(holder) = self.holder_of(index) else {
            return self.settle(index, ReservationStatus::Confirmed, None);
        };

        let candidate = &self.reservations[index];
        let holder = &self.reservations[holder];
        let error = ReservationError::ResourceConflict {
            peer: candidate.mobility_peer_id.clone(),
            resource: candidate.resource_id.clone().unwrap_or_default(),
            holder: holder.id,
        };
        warn!("Reservation {} rejected: {}", candidate.id, error);

        let conflict = Conflict {
            holder: holder.id,
            rejected: candidate.id,
            mobility_peer_id: candidate.mobility_peer_id.clone(),
            resource_id: candidate.resource_id.clone().unwrap_or_default(),
            window: candidate.window,
            commuter_id: candidate.commuter_id.clone(),
            demand_id: candidate.demand_id.clone(),
            requested_by: candidate.requested_by.clone(),
        };
        self.conflicts.push(conflict.clone());

        let mut decision = self.settle(index, ReservationStatus::Rejected, Some(error.to_string()))?;
        decision.conflict = Some(conflict);
        Ok(decision)
    }

    /// Reject a pending request without an answer from the mobility peer
    pub fn reject(&mut self, id: ReservationId, reason: &str) -> ReservationResult<Decision> {
        let index = self.pending_index(id)?;
        self.settle(index, ReservationStatus::Rejected, Some(reason.to_string()))
    }

    /// Cancel the commuter's booking for a demand
    pub fn cancel(&mut self, commuter_id: &str, demand_id: &str) -> CancelOutcome {
        let key = (commuter_id.to_string(), demand_id.to_string());
        let Some(&index) = self.by_demand.get(&key) else {
            return CancelOutcome::Unknown;
        };

        let reservation = &mut self.reservations[index];
        match reservation.status {
            ReservationStatus::Confirmed => {
                reservation.status = ReservationStatus::Cancelled;
                info!("Reservation {} cancelled", reservation.id);
                CancelOutcome::Applied(reservation.clone())
            }
            ReservationStatus::Requested => {
                debug!("Cancellation of {} deferred until decided", reservation.id);
                self.deferred_cancels.insert(reservation.id);
                CancelOutcome::Deferred(reservation.id)
            }
            status => CancelOutcome::Stale(status),
        }
    }

    /// Confirmed bookings holding `resource` on `peer`
    pub fn confirmed_for<'a>(
        &'a self,
        peer: &'a PeerId,
        resource: &'a str,
    ) -> impl Iterator<Item = &'a Reservation> + 'a {
        self.reservations.iter().filter(move |r| {
            r.status == ReservationStatus::Confirmed
                && &r.mobility_peer_id == peer
                && r.resource_id.as_deref() == Some(resource)
        })
    }

    /// Requests still awaiting a decision, in request order
    pub fn pending(&self) -> impl Iterator<Item = &Reservation> {
        self.pending.values().map(|&index| &self.reservations[index])
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.by_id.get(&id).map(|&index| &self.reservations[index])
    }

    /// Every booking in request order
    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    fn pending_index(&self, id: ReservationId) -> ReservationResult<usize> {
        let index = *self
            .by_id
            .get(&id)
            .ok_or(ReservationError::UnknownReservation(id))?;
        let reservation = &self.reservations[index];

        if reservation.status != ReservationStatus::Requested {
            return Err(ReservationError::InvalidTransition {
                id,
                from: reservation.status,
                to: ReservationStatus::Confirmed,
            });
        }

        if let Some((_, &first)) = self.pending.first_key_value() {
            if first != index {
                return Err(ReservationError::OutOfOrder {
                    id,
                    earlier: self.reservations[first].id,
                });
            }
        }
        Ok(index)
    }

    /// Earliest-requested confirmed booking colliding with the one at `index`
    fn holder_of(&self, index: usize) -> Option<usize> {
        let candidate = &self.reservations[index];
        self.reservations
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                *i != index && r.status == ReservationStatus::Confirmed && r.collides_with(candidate)
            })
            .min_by_key(|(_, r)| r.request_seq)
            .map(|(i, _)| i)
    }

    fn settle(
        &mut self,
        index: usize,
        status: ReservationStatus,
        reason: Option<String>,
    ) -> ReservationResult<Decision> {
        let reservation = &mut self.reservations[index];
        if !reservation.status.can_transition_to(status) {
            return Err(ReservationError::InvalidTransition {
                id: reservation.id,
                from: reservation.status,
                to: status,
            });
        }

        reservation.status = status;
        reservation.reason = reason;
        self.pending.remove(&reservation.request_seq);

        info!(
            "Reservation {} {:?} ({}/{} on {})",
            reservation.id,
            status,
            reservation.commuter_id,
            reservation.demand_id,
            reservation.mobility_peer_id
        );

        let replayed_cancel = self.deferred_cancels.remove(&reservation.id)
            && status == ReservationStatus::Confirmed;
        if replayed_cancel {
            reservation.status = ReservationStatus::Cancelled;
            info!("Reservation {} cancelled (deferred)", reservation.id);
        }

        Ok(Decision {
            reservation: reservation.clone(),
            conflict: None,
            replayed_cancel,
        })
    }
}

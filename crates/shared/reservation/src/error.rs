use junction_core::{PeerId, ReservationId, ReservationStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    #[error("Reservation {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Reservation {id} decided before earlier request {earlier}")]
    OutOfOrder {
        id: ReservationId,
        earlier: ReservationId,
    },

    #[error("Resource {resource} on {peer} already held by reservation {holder}")]
    ResourceConflict {
        peer: PeerId,
        resource: String,
        holder: ReservationId,
    },
}

pub type ReservationResult<T> = std::result::Result<T, ReservationError>;

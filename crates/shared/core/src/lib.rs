//! Junction Core Domain
//!
//! Pure domain types for the Junction simulation broker.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Events
    Event,
    EventKind,
    // Run lifecycle
    FailureReason,
    // Peers
    BROKER_PEER,
    Peer,
    PeerId,
    PeerKind,
    // Reservations
    AnswerStatus,
    PayloadError,
    Reservation,
    ReservationAnswer,
    ReservationId,
    ReservationRequest,
    ReservationStatus,
    RunId,
    RunPhase,
    RunStatus,
    demand_key,
};
pub use values::{InvalidTime, SimTime, TimeWindow};

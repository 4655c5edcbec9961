//! Junction Reservation Coordinator
//!
//! Mediates booking requests between demand-side peers and the mobility
//! peers that own the resources. The mobility peer's answer is
//! authoritative; the coordinator only caches it, orders the decisions,
//! and enforces that no two confirmed bookings share a resource slot.

mod coordinator;
mod error;
mod notices;

pub use coordinator::{CancelOutcome, Conflict, Decision, ReservationCoordinator};
pub use error::{ReservationError, ReservationResult};
pub use notices::{correction_event, result_event, void_event};

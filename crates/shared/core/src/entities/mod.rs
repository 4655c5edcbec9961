mod event;
mod peer;
mod reservation;
mod run;

pub use event::{Event, EventKind};
pub use peer::{BROKER_PEER, Peer, PeerId, PeerKind};
pub use reservation::{
    AnswerStatus, PayloadError, Reservation, ReservationAnswer, ReservationId, ReservationRequest,
    ReservationStatus, demand_key,
};
pub use run::{FailureReason, RunId, RunPhase, RunStatus};

use junction_core::{PeerId, SimTime};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("No round is open")]
    NoOpenRound,

    #[error("Round {0} is still open")]
    RoundStillOpen(u64),

    #[error("Peer {0} is not scheduled for this round")]
    UnexpectedPeer(PeerId),

    #[error("Peer {0} already responded this round")]
    DuplicateResponse(PeerId),

    #[error("Event from {peer} at {time} precedes the clock ({now})")]
    StaleEvent {
        peer: PeerId,
        time: SimTime,
        now: SimTime,
    },

    #[error("Round incomplete, waiting on {missing:?}")]
    RoundIncomplete { missing: Vec<PeerId> },
}

pub type MergeResult<T> = std::result::Result<T, MergeError>;

use junction_core::SimTime;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("Clock cannot move backwards from {from} to {to}")]
    Rewind { from: SimTime, to: SimTime },

    #[error("Target {to} lies beyond the horizon {horizon}")]
    BeyondHorizon { to: SimTime, horizon: SimTime },

    #[error("Horizon {horizon} precedes start time {start}")]
    InvalidHorizon { start: SimTime, horizon: SimTime },

    #[error("Fixed step must be positive, got {0}")]
    InvalidStep(String),
}

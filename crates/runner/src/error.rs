//! Error types for the runner crate

use junction_clock::ClockError;
use junction_core::{FailureReason, PeerId, PeerKind, RunPhase};
use junction_gateway::GatewayError;
use junction_merge::MergeError;
use junction_ports::PeerError;
use thiserror::Error;

/// Peer registry errors; fatal to setup only
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate peer: {0}")]
    DuplicatePeer(PeerId),

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    #[error("Registry is frozen, cannot register {0}")]
    Frozen(PeerId),
}

/// Scenario settings errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("No broker entry in settings")]
    MissingBroker,

    #[error("More than one broker entry: {0}")]
    DuplicateBroker(String),

    #[error("Invalid endpoint for {peer}: {error}")]
    InvalidEndpoint { peer: String, error: String },

    #[error("Details of {0} must be a JSON object")]
    InvalidDetails(String),

    #[error("Invalid horizon: {0}")]
    InvalidHorizon(f64),

    #[error("Invalid step: {0}")]
    InvalidStep(f64),

    #[error("Invalid retry policy: {0}")]
    InvalidRetry(String),
}

/// Run lifecycle errors
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Peer call failed: {0}")]
    Peer(#[from] PeerError),

    #[error("No online {0} peer")]
    MissingPeer(PeerKind),

    #[error("Operation requires phase {expected}, run is {actual}")]
    InvalidPhase {
        expected: RunPhase,
        actual: RunPhase,
    },

    #[error("Setup probe failed for mandatory peer {0}")]
    SetupProbeFailed(PeerId),

    #[error("Mandatory peer {0} is offline")]
    MandatoryPeerOffline(PeerId),

    #[error("Horizon unreachable")]
    HorizonUnreachable,

    #[error("Run aborted")]
    Aborted,
}

impl RunError {
    /// Terminal failure this error moves the run to, if it is fatal
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            RunError::SetupProbeFailed(peer) => Some(FailureReason::SetupProbeFailed {
                peer: peer.clone(),
            }),
            RunError::MandatoryPeerOffline(peer) => Some(FailureReason::MandatoryPeerOffline {
                peer: peer.clone(),
            }),
            RunError::HorizonUnreachable => Some(FailureReason::HorizonUnreachable),
            RunError::Aborted => Some(FailureReason::Aborted),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RunError>;

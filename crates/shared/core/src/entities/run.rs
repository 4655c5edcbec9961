use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::PeerId;

/// Identifier of one simulation run
pub type RunId = Uuid;

/// Run lifecycle phase
///
/// `INIT → SETUP → RUNNING → FINALIZING → DONE`, with `FAILED` reachable
/// from `SETUP` or `RUNNING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Init,
    Setup,
    Running,
    Finalizing,
    Done,
    Failed,
}

impl RunPhase {
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Init, RunPhase::Setup)
                | (RunPhase::Setup, RunPhase::Running)
                | (RunPhase::Setup, RunPhase::Failed)
                | (RunPhase::Running, RunPhase::Finalizing)
                | (RunPhase::Running, RunPhase::Failed)
                | (RunPhase::Finalizing, RunPhase::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    /// Peers may still be registered in this phase
    pub fn accepts_registration(&self) -> bool {
        matches!(self, RunPhase::Init | RunPhase::Setup)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "INIT",
            RunPhase::Setup => "SETUP",
            RunPhase::Running => "RUNNING",
            RunPhase::Finalizing => "FINALIZING",
            RunPhase::Done => "DONE",
            RunPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Why a run ended in `FAILED`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum FailureReason {
    MandatoryPeerOffline { peer: PeerId },
    SetupProbeFailed { peer: PeerId },
    HorizonUnreachable,
    /// Operator-requested abort
    Aborted,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::MandatoryPeerOffline { .. } => "mandatory-peer-offline",
            FailureReason::SetupProbeFailed { .. } => "setup-probe-failed",
            FailureReason::HorizonUnreachable => "horizon-unreachable",
            FailureReason::Aborted => "aborted",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MandatoryPeerOffline { peer } | FailureReason::SetupProbeFailed { peer } => {
                write!(f, "{} ({})", self.code(), peer)
            }
            _ => f.write_str(self.code()),
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Done,
    Failed(FailureReason),
}

impl RunStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, RunStatus::Done)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            RunStatus::Done => None,
            RunStatus::Failed(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_edges() {
        use RunPhase::*;

        assert!(Init.can_transition_to(Setup));
        assert!(Setup.can_transition_to(Running));
        assert!(Running.can_transition_to(Finalizing));
        assert!(Finalizing.can_transition_to(Done));
        assert!(Setup.can_transition_to(Failed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Init.can_transition_to(Running));
        assert!(!Finalizing.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Running));
    }

    #[test]
    fn test_failure_codes() {
        let reason = FailureReason::MandatoryPeerOffline {
            peer: PeerId::from("P4"),
        };
        assert_eq!(reason.code(), "mandatory-peer-offline");
        assert_eq!(reason.to_string(), "mandatory-peer-offline (P4)");
        assert_eq!(FailureReason::HorizonUnreachable.to_string(), "horizon-unreachable");
    }

    #[test]
    fn test_status_serialization() {
        let failed = RunStatus::Failed(FailureReason::HorizonUnreachable);
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["reason"], "horizon-unreachable");

        let done = serde_json::to_value(RunStatus::Done).unwrap();
        assert_eq!(done["status"], "DONE");
    }
}

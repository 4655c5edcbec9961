//! Run report
//!
//! Snapshot of a run for operators: where it is, how it ended, and which
//! peers dropped out on the way.

use chrono::{DateTime, Utc};
use junction_core::{PeerId, RunId, RunPhase, RunStatus, SimTime};
use junction_gateway::PeerHealth;
use junction_reservation::Conflict;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PeerReport {
    pub id: PeerId,
    pub kind: junction_core::PeerKind,
    pub mandatory: bool,
    pub health: PeerHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub phase: RunPhase,
    /// Set once the run is DONE or FAILED
    #[serde(flatten)]
    pub status: Option<RunStatus>,
    pub current_time: SimTime,
    pub horizon: SimTime,
    pub rounds: u64,
    pub events: usize,
    pub peers: Vec<PeerReport>,
    pub offline: Vec<PeerId>,
    pub degraded: Vec<PeerId>,
    pub conflicts: Vec<Conflict>,
    pub pending_reservations: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(RunStatus::is_done)
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_core::FailureReason;
    use uuid::Uuid;

    fn report(status: Option<RunStatus>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            phase: RunPhase::Failed,
            status,
            current_time: SimTime::from(4),
            horizon: SimTime::from(10),
            rounds: 2,
            events: 5,
            peers: Vec::new(),
            offline: vec![PeerId::from("P4")],
            degraded: Vec::new(),
            conflicts: Vec::new(),
            pending_reservations: 0,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    #[test]
    fn test_status_is_flattened() {
        let failed = report(Some(RunStatus::Failed(FailureReason::MandatoryPeerOffline {
            peer: PeerId::from("P4"),
        })));
        let value = serde_json::to_value(&failed).unwrap();

        assert_eq!(value["phase"], "FAILED");
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["reason"], "mandatory-peer-offline");
        assert_eq!(value["peer"], "P4");
        assert_eq!(value["offline"][0], "P4");
        assert!(!failed.is_done());
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_running_report_has_no_status() {
        let value = serde_json::to_value(report(None)).unwrap();
        assert!(value.get("status").is_none());
        assert_eq!(value["current_time"], 4.0);
    }
}

//! Live feed of merged rounds
//!
//! Observers (the control API, tests, dashboards) subscribe to receive
//! every round's merged events as soon as the round is delivered.

use junction_core::SimTime;
use junction_merge::MergedEvent;
use serde::Serialize;
use tokio::sync::broadcast;

/// One delivered round
#[derive(Debug, Clone, Serialize)]
pub struct RoundBatch {
    pub round: u64,
    pub time: SimTime,
    pub events: Vec<MergedEvent>,
}

/// Broadcasts delivered rounds to any number of subscribers
pub struct EventFeed {
    tx: broadcast::Sender<RoundBatch>,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundBatch> {
        self.tx.subscribe()
    }

    /// Publish a round; no subscribers is not an error
    pub fn publish(&self, batch: RoundBatch) {
        let _ = self.tx.send(batch);
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(1000)
    }
}

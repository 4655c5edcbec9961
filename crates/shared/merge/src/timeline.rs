use junction_core::{Event, SimTime};
use serde::{Deserialize, Serialize};

/// One entry of the run's merged timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEvent {
    /// Position in the whole run, starting at 0
    pub seqno: u64,
    /// Round the event was released in
    pub round: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// Append-only record of every event the broker released
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<MergedEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the released events of one round, returning the new entries
    pub fn record(&mut self, round: u64, events: Vec<Event>) -> &[MergedEvent] {
        let start = self.entries.len();
        for event in events {
            let seqno = self.entries.len() as u64;
            self.entries.push(MergedEvent {
                seqno,
                round,
                event,
            });
        }
        &self.entries[start..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergedEvent> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[MergedEvent] {
        &self.entries
    }

    /// Entries from `seqno` on
    pub fn since(&self, seqno: u64) -> &[MergedEvent] {
        let start = (seqno as usize).min(self.entries.len());
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time of the latest released event
    pub fn last_time(&self) -> Option<SimTime> {
        self.entries.last().map(|entry| entry.event.time)
    }
}

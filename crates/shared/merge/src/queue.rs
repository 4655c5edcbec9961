use junction_core::{Event, PeerId, SimTime};
use junction_ports::Clock;
use log::{debug, info};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::error::{MergeError, MergeResult};

/// Priority rank of a peer, fixed at registration (lower merges first)
pub type PeerRank = u32;

/// Total order of events inside one round
///
/// Field order matters: the derived `Ord` compares time, then rank, then
/// arrival sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MergeKey {
    pub time: SimTime,
    pub rank: PeerRank,
    pub seq: u32,
}

/// The released, ordered stream of one round
#[derive(Debug, Clone)]
pub struct ClosedRound {
    pub index: u64,
    pub time: SimTime,
    pub events: Vec<Event>,
    /// Peers that exhausted their retry budget instead of responding
    pub abandoned: Vec<PeerId>,
}

struct OpenRound {
    index: u64,
    time: SimTime,
    /// Clock reading when the round opened; nothing earlier is admitted
    floor: SimTime,
    waiting: BTreeSet<PeerId>,
    abandoned: Vec<PeerId>,
    heap: PriorityQueue<usize, Reverse<MergeKey>>,
    slab: Vec<Option<Event>>,
}

/// Per-round merge queue
///
/// Buffers partial results and refuses to release a round until every
/// scheduled peer has been accounted for. This is the serialization point
/// of an otherwise peer-parallel round.
pub struct MergeQueue {
    clock: Box<dyn Clock>,
    round: Option<OpenRound>,
    next_index: u64,
}

impl MergeQueue {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            round: None,
            next_index: 0,
        }
    }

    /// Start buffering a round at `time` for the given peers
    pub fn open_round(
        &mut self,
        time: SimTime,
        scheduled: impl IntoIterator<Item = PeerId>,
    ) -> MergeResult<u64> {
        if let Some(round) = &self.round {
            return Err(MergeError::RoundStillOpen(round.index));
        }

        let index = self.next_index;
        self.next_index += 1;
        let waiting: BTreeSet<PeerId> = scheduled.into_iter().collect();

        debug!(
            "Opening merge round {} at t={} for {} peers",
            index,
            time,
            waiting.len()
        );

        self.round = Some(OpenRound {
            index,
            time,
            floor: self.clock.now(),
            waiting,
            abandoned: Vec::new(),
            heap: PriorityQueue::new(),
            slab: Vec::new(),
        });
        Ok(index)
    }

    /// Buffer the events one peer returned for the open round
    ///
    /// The whole batch is rejected if any event precedes the clock as it
    /// stood when the round opened, so a peer's batch is admitted
    /// atomically or not at all. The clock may already have moved to the
    /// round time.
    pub fn admit(&mut self, peer: &PeerId, rank: PeerRank, events: Vec<Event>) -> MergeResult<()> {
        let round = self.round.as_mut().ok_or(MergeError::NoOpenRound)?;
        let now = round.floor;

        if !round.waiting.contains(peer) {
            return if round.abandoned.contains(peer) || round_has_responded(round, peer) {
                Err(MergeError::DuplicateResponse(peer.clone()))
            } else {
                Err(MergeError::UnexpectedPeer(peer.clone()))
            };
        }

        if let Some(stale) = events.iter().find(|e| e.time < now) {
            return Err(MergeError::StaleEvent {
                peer: peer.clone(),
                time: stale.time,
                now,
            });
        }

        debug!(
            "Round {}: admitting {} events from {} (rank {})",
            round.index,
            events.len(),
            peer,
            rank
        );

        for (seq, event) in events.into_iter().enumerate() {
            let key = MergeKey {
                time: event.time,
                rank,
                seq: seq as u32,
            };
            let slot = round.slab.len();
            round.slab.push(Some(event));
            round.heap.push(slot, Reverse(key));
        }
        round.waiting.remove(peer);
        Ok(())
    }

    /// Give up on a peer for the open round (retry budget exhausted)
    pub fn abandon(&mut self, peer: &PeerId) -> MergeResult<()> {
        let round = self.round.as_mut().ok_or(MergeError::NoOpenRound)?;
        if !round.waiting.remove(peer) {
            return Err(MergeError::UnexpectedPeer(peer.clone()));
        }
        round.abandoned.push(peer.clone());
        Ok(())
    }

    /// Whether the open round has heard from every scheduled peer
    pub fn is_closed(&self) -> bool {
        self.round.as_ref().is_some_and(|r| r.waiting.is_empty())
    }

    pub fn is_open(&self) -> bool {
        self.round.is_some()
    }

    /// Release the merged stream of the open round
    pub fn close(&mut self) -> MergeResult<ClosedRound> {
        let round = self.round.as_ref().ok_or(MergeError::NoOpenRound)?;
        if !round.waiting.is_empty() {
            return Err(MergeError::RoundIncomplete {
                missing: round.waiting.iter().cloned().collect(),
            });
        }

        let Some(mut round) = self.round.take() else {
            return Err(MergeError::NoOpenRound);
        };

        let mut events = Vec::with_capacity(round.slab.len());
        while let Some((slot, _)) = round.heap.pop() {
            if let Some(event) = round.slab[slot].take() {
                events.push(event);
            }
        }

        info!(
            "Closed merge round {} at t={} with {} events",
            round.index,
            round.time,
            events.len()
        );

        Ok(ClosedRound {
            index: round.index,
            time: round.time,
            events,
            abandoned: round.abandoned,
        })
    }
}

fn round_has_responded(round: &OpenRound, peer: &PeerId) -> bool {
    round.slab.iter().flatten().any(|e| &e.source == peer)
}

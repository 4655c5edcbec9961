//! Round scheduler
//!
//! Conservative time-stepped synchronization. Each round:
//!
//! 1. peek every online scheduled peer
//! 2. pick the global target `T` from the earliest pending time
//! 3. advance, concurrently, only the peers whose next time is at or before `T`
//! 4. move the clock to `T` and merge what the peers returned
//! 5. route booking requests, then deliver the merged stream
//!
//! A peer is never advanced past a time it still has work at, so every
//! peer's own timeline stays causally ordered and the merged stream is
//! globally non-decreasing in time.

use futures_util::future::join_all;
use junction_clock::{ClockError, ClockHandle, SimulationClock};
use junction_core::{PeerId, SimTime};
use junction_gateway::Advance;
use junction_merge::{MergeError, MergeQueue, MergedEvent, Timeline};
use junction_reservation::ReservationCoordinator;
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::delivery::{DeliveryStats, deliver_round};
use crate::error::{Result, RunError};
use crate::peers::{PeerEntry, PeerSet};
use crate::reservations::route_round;
use crate::settings::RunConfig;

/// What happened in one round
#[derive(Debug, Clone)]
pub struct RoundSummary {
    pub index: u64,
    pub time: SimTime,
    /// Peers whose events were merged, in rank order
    pub advanced: Vec<PeerId>,
    /// Peers that failed to answer this round
    pub abandoned: Vec<PeerId>,
    /// Released events, broker notices last
    pub events: Vec<MergedEvent>,
    pub delivery: DeliveryStats,
}

#[derive(Debug, Clone)]
pub enum RoundOutcome {
    Advanced(RoundSummary),
    /// Nothing is pending at or before the horizon
    Complete,
    /// The next round lies past the requested bound; nothing was run
    Paused(SimTime),
}

pub struct Scheduler {
    clock: SimulationClock,
    merge: MergeQueue,
    peers: PeerSet,
    timeline: Timeline,
    coordinator: ReservationCoordinator,
    offline_after: u32,
    max_rounds: u64,
    rounds: u64,
    /// Whether any peer ever reported a finite next time
    ever_pending: bool,
    /// Latest peeked next time per peer
    last_peek: HashMap<PeerId, Option<SimTime>>,
}

impl Scheduler {
    pub fn new(config: &RunConfig, peers: PeerSet) -> std::result::Result<Self, ClockError> {
        let clock = SimulationClock::new(config.start, config.horizon, config.step_mode)?;
        let merge = MergeQueue::new(clock.subscribe());

        Ok(Self {
            clock,
            merge,
            peers,
            timeline: Timeline::new(),
            coordinator: ReservationCoordinator::new(),
            offline_after: config.offline_after,
            max_rounds: config.max_rounds,
            rounds: 0,
            ever_pending: false,
            last_peek: HashMap::new(),
        })
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn horizon(&self) -> SimTime {
        self.clock.horizon()
    }

    pub fn clock(&self) -> ClockHandle {
        self.clock.subscribe()
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn coordinator(&self) -> &ReservationCoordinator {
        &self.coordinator
    }

    /// Rounds executed so far, the final flush included
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Next time `peer` reported at its latest peek
    pub fn last_peek(&self, peer: &PeerId) -> Option<SimTime> {
        self.last_peek.get(peer).copied().flatten()
    }

    /// Time the next round would run at, without running it
    pub async fn peek(&self) -> Option<SimTime> {
        let peeked = peek_all(&self.peers).await;
        let earliest = peeked.iter().filter_map(|(_, next)| *next).min();
        self.clock.next_target(earliest)
    }

    /// Run one round
    pub async fn run_round(&mut self) -> Result<RoundOutcome> {
        self.run_round_until(None).await
    }

    /// Run one round unless it would move the clock past `until`
    pub async fn run_round_until(&mut self, until: Option<SimTime>) -> Result<RoundOutcome> {
        if self.rounds >= self.max_rounds {
            warn!(
                "Round cap {} reached at t={} before horizon {}",
                self.max_rounds,
                self.now(),
                self.horizon()
            );
            return Err(RunError::HorizonUnreachable);
        }

        let peeked = peek_all(&self.peers).await;
        for (entry, next) in &peeked {
            self.last_peek.insert(entry.id().clone(), *next);
        }

        let earliest = peeked.iter().filter_map(|(_, next)| *next).min();
        if earliest.is_some() {
            self.ever_pending = true;
        }

        let Some(target) = self.clock.next_target(earliest) else {
            if !self.ever_pending && !self.clock.at_horizon() {
                warn!("No peer ever reported a next event time");
                return Err(RunError::HorizonUnreachable);
            }
            info!("All peers quiescent at t={}", self.now());
            return Ok(RoundOutcome::Complete);
        };

        if until.is_some_and(|until| target > until) {
            debug!("Next round at t={} lies past the bound, pausing", target);
            return Ok(RoundOutcome::Paused(target));
        }

        let due: Vec<PeerEntry> = peeked
            .into_iter()
            .filter(|(_, next)| next.is_some_and(|t| t <= target))
            .map(|(entry, _)| entry)
            .collect();

        let summary = self.execute(target, due).await?;
        Ok(RoundOutcome::Advanced(summary))
    }

    /// Final round: advance every online scheduled peer to the horizon
    pub async fn flush_round(&mut self) -> Result<RoundSummary> {
        let horizon = self.horizon();
        let due: Vec<PeerEntry> = self.peers.scheduled().cloned().collect();
        info!("Flushing {} peers at horizon {}", due.len(), horizon);
        self.execute(horizon, due).await
    }

    async fn execute(&mut self, target: SimTime, due: Vec<PeerEntry>) -> Result<RoundSummary> {
        let index = self
            .merge
            .open_round(target, due.iter().map(|e| e.id().clone()))?;
        debug!(
            "Round {} at t={}: advancing {:?}",
            index,
            target,
            due.iter().map(|e| e.id().as_str()).collect::<Vec<_>>()
        );

        let results = join_all(due.iter().map(|entry| entry.guard.advance_to(target))).await;
        self.clock.advance(target)?;

        let mut advanced = Vec::new();
        for (entry, result) in due.iter().zip(results) {
            let events = match result {
                Ok(Advance {
                    replayed: true,
                    events,
                }) => {
                    debug!("{} replayed {} events for t={}", entry.id(), events.len(), target);
                    Vec::new()
                }
                Ok(Advance { events, .. }) => events,
                Err(e) => {
                    if !e.counts_as_failure() {
                        entry.guard.mark_offline();
                    }
                    warn!("{} abandoned in round {}: {}", entry.id(), index, e);
                    self.merge.abandon(entry.id())?;
                    continue;
                }
            };

            match self.merge.admit(entry.id(), entry.rank, events) {
                Ok(()) => advanced.push(entry.id().clone()),
                Err(e @ MergeError::StaleEvent { .. }) => {
                    warn!("{} abandoned in round {}: {}", entry.id(), index, e);
                    self.peers.health().record_failure(entry.id(), self.offline_after);
                    self.merge.abandon(entry.id())?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let closed = self.merge.close()?;
        let notices = route_round(&mut self.coordinator, &self.peers, &closed.events, target).await;

        let mut events = closed.events;
        events.extend(notices);
        let released = self.timeline.record(closed.index, events).to_vec();
        let delivery = deliver_round(&self.peers, &released).await;
        self.rounds += 1;

        info!(
            "Round {} at t={}: {} peers advanced, {} events released",
            closed.index,
            target,
            advanced.len(),
            released.len()
        );

        Ok(RoundSummary {
            index: closed.index,
            time: target,
            advanced,
            abandoned: closed.abandoned,
            events: released,
            delivery,
        })
    }
}

/// Peek every online scheduled peer concurrently
///
/// Peers that go offline while peeking are left out. A reported time at
/// or before the peer's last advance is already handled and counts as
/// nothing pending.
async fn peek_all(peers: &PeerSet) -> Vec<(PeerEntry, Option<SimTime>)> {
    let scheduled: Vec<PeerEntry> = peers.scheduled().cloned().collect();
    let peeked = join_all(scheduled.iter().map(peek_settled)).await;

    scheduled
        .into_iter()
        .zip(peeked)
        .filter_map(|(entry, next)| next.map(|next| (entry, next)))
        .collect()
}

/// Peek one peer until it answers or goes offline
///
/// The global target must account for every online peer, so a peek that
/// failed transiently is asked again; each failure counts toward the
/// peer's offline threshold, which bounds the loop. A malformed answer
/// is not retried: the peer sits out this round and is peeked afresh
/// next round.
async fn peek_settled(entry: &PeerEntry) -> Option<Option<SimTime>> {
    loop {
        match entry.guard.peek().await {
            Ok(next) => {
                let advanced = entry.guard.advanced_to().await;
                let next = match (next, advanced) {
                    (Some(t), Some(last)) if t <= last => {
                        debug!("{} reported t={} already advanced to {}", entry.id(), t, last);
                        None
                    }
                    (next, _) => next,
                };
                return Some(next);
            }
            Err(e) if entry.is_offline() => {
                debug!("{} offline while peeking: {}", entry.id(), e);
                return None;
            }
            Err(e) if !e.counts_as_failure() => {
                warn!("{} cannot be scheduled: {}", entry.id(), e);
                entry.guard.mark_offline();
                return None;
            }
            Err(e) if e.is_transient() => debug!("Peeking {} again after: {}", entry.id(), e),
            Err(e) => {
                warn!("{} skipped this round: {}", entry.id(), e);
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_clock::StepMode;
    use junction_core::{EventKind, PeerKind};
    use junction_gateway::{
        Call, Fault, GuardedPeer, HealthBoard, Operation, PeerHealth, RetryPolicy, ScriptedPeer,
    };
    use junction_ports::PeerError;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn t(v: f64) -> SimTime {
        SimTime::new(v).unwrap()
    }

    fn config(horizon: u32) -> RunConfig {
        RunConfig {
            horizon: SimTime::from(horizon),
            retry: RetryPolicy {
                timeout_ms: 50,
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 4,
                jitter: false,
            },
            ..RunConfig::default()
        }
    }

    fn scheduler(config: &RunConfig, peers: Vec<Arc<ScriptedPeer>>) -> Scheduler {
        let health = HealthBoard::new();
        let mut set = PeerSet::new(health.clone());
        for (rank, adapter) in peers.into_iter().enumerate() {
            set.push(PeerEntry {
                guard: Arc::new(GuardedPeer::new(
                    adapter,
                    config.retry.clone(),
                    config.offline_after,
                    health.clone(),
                )),
                rank: rank as u32,
                mandatory: true,
            });
        }
        Scheduler::new(config, set).unwrap()
    }

    fn advanced(outcome: RoundOutcome) -> RoundSummary {
        match outcome {
            RoundOutcome::Advanced(summary) => summary,
            other => panic!("round did not advance: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_due_peers_advance() {
        let early = Arc::new(ScriptedPeer::new("early").emit(3.0, EventKind::Demand, json!({})));
        let late = Arc::new(ScriptedPeer::new("late").emit(7.0, EventKind::Demand, json!({})));
        let mut scheduler = scheduler(&config(10), vec![early.clone(), late.clone()]);

        let round = advanced(scheduler.run_round().await.unwrap());
        assert_eq!(round.time, t(3.0));
        assert_eq!(round.advanced, vec![PeerId::from("early")]);
        assert!(late.advances().await.is_empty());
        assert_eq!(scheduler.last_peek(&PeerId::from("late")), Some(t(7.0)));

        let round = advanced(scheduler.run_round().await.unwrap());
        assert_eq!(round.time, t(7.0));
        assert_eq!(late.advances().await, vec![t(7.0)]);

        assert!(matches!(
            scheduler.run_round().await.unwrap(),
            RoundOutcome::Complete
        ));
        assert_eq!(scheduler.now(), t(7.0));
        assert_eq!(scheduler.timeline().len(), 2);
    }

    #[tokio::test]
    async fn test_fixed_increment_caps_each_jump() {
        let peer = Arc::new(ScriptedPeer::new("walking").emit(12.0, EventKind::Arrival, json!({})));
        let config = RunConfig {
            step_mode: StepMode::FixedIncrement { step: 5.0 },
            ..config(20)
        };
        let mut scheduler = scheduler(&config, vec![peer.clone()]);

        let times: Vec<SimTime> = [
            scheduler.run_round().await.unwrap(),
            scheduler.run_round().await.unwrap(),
            scheduler.run_round().await.unwrap(),
        ]
        .into_iter()
        .map(|outcome| advanced(outcome).time)
        .collect();

        assert_eq!(times, vec![t(5.0), t(10.0), t(12.0)]);
        assert_eq!(peer.advances().await, vec![t(12.0)]);
    }

    #[tokio::test]
    async fn test_bounded_round_pauses_without_advancing() {
        let peer = Arc::new(ScriptedPeer::new("user").wake_at(3.0).wake_at(6.0));
        let mut scheduler = scheduler(&config(10), vec![peer.clone()]);

        let round = advanced(scheduler.run_round_until(Some(t(5.0))).await.unwrap());
        assert_eq!(round.time, t(3.0));

        assert!(matches!(
            scheduler.run_round_until(Some(t(5.0))).await.unwrap(),
            RoundOutcome::Paused(next) if next == t(6.0)
        ));
        assert_eq!(scheduler.now(), t(3.0));
        assert_eq!(peer.advances().await, vec![t(3.0)]);
        assert_eq!(scheduler.timeline().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_beyond_horizon_completes() {
        let peer = Arc::new(ScriptedPeer::new("late").wake_at(50.0));
        let mut scheduler = scheduler(&config(10), vec![peer.clone()]);

        assert!(matches!(
            scheduler.run_round().await.unwrap(),
            RoundOutcome::Complete
        ));
        assert!(peer.advances().await.is_empty());
    }

    #[tokio::test]
    async fn test_never_pending_is_unreachable() {
        let mut scheduler = scheduler(&config(10), vec![Arc::new(ScriptedPeer::new("idle"))]);
        assert!(matches!(
            scheduler.run_round().await,
            Err(RunError::HorizonUnreachable)
        ));
    }

    #[tokio::test]
    async fn test_round_cap() {
        let peer = Arc::new(
            ScriptedPeer::new("busy")
                .wake_at(1.0)
                .wake_at(2.0)
                .wake_at(3.0),
        );
        let config = RunConfig {
            max_rounds: 2,
            ..config(10)
        };
        let mut scheduler = scheduler(&config, vec![peer]);

        scheduler.run_round().await.unwrap();
        scheduler.run_round().await.unwrap();
        assert!(matches!(
            scheduler.run_round().await,
            Err(RunError::HorizonUnreachable)
        ));
    }

    #[tokio::test]
    async fn test_malformed_peek_sits_out_one_round() {
        let flaky = Arc::new(ScriptedPeer::new("flaky").wake_at(6.0).with_faults(
            Operation::Peek,
            1,
            Fault::Fail(PeerError::Protocol("garbled".into())),
        ));
        let steady = Arc::new(ScriptedPeer::new("steady").emit(4.0, EventKind::Demand, json!({})));
        let mut scheduler = scheduler(&config(10), vec![flaky.clone(), steady.clone()]);

        let first = advanced(scheduler.run_round().await.unwrap());
        assert_eq!(first.time, t(4.0));
        assert_eq!(first.advanced, vec![PeerId::from("steady")]);
        let peeks = flaky
            .calls()
            .await
            .into_iter()
            .filter(|call| matches!(call, Call::Peek(_)))
            .count();
        assert_eq!(peeks, 1);
        assert_eq!(
            scheduler.peers().health().get(&PeerId::from("flaky")),
            PeerHealth::Degraded {
                consecutive_failures: 1
            }
        );

        let second = advanced(scheduler.run_round().await.unwrap());
        assert_eq!(second.time, t(6.0));
        assert_eq!(flaky.advances().await, vec![t(6.0)]);
        assert_eq!(scheduler.peers().health().get(&PeerId::from("flaky")), PeerHealth::Healthy);
    }

    #[tokio::test]
    async fn test_timed_out_peek_is_asked_again() {
        let slow = Arc::new(ScriptedPeer::new("slow").wake_at(4.0).with_faults(
            Operation::Peek,
            1,
            Fault::Fail(PeerError::Timeout(Duration::from_millis(50))),
        ));
        let mut scheduler = scheduler(&config(10), vec![slow.clone()]);

        let round = advanced(scheduler.run_round().await.unwrap());
        assert_eq!(round.time, t(4.0));
        assert_eq!(slow.advances().await, vec![t(4.0)]);
    }

    #[tokio::test]
    async fn test_failed_advance_is_abandoned_then_retried() {
        let flaky = Arc::new(
            ScriptedPeer::new("flaky")
                .emit(4.0, EventKind::Departure, json!({}))
                .with_faults(
                    Operation::Advance,
                    1,
                    Fault::Fail(PeerError::Protocol("garbled".into())),
                ),
        );
        let mut scheduler = scheduler(&config(10), vec![flaky.clone()]);

        let first = advanced(scheduler.run_round().await.unwrap());
        assert_eq!(first.abandoned, vec![PeerId::from("flaky")]);
        assert!(first.events.is_empty());
        assert_eq!(scheduler.now(), t(4.0));

        // still pending at 4, so the same time is asked for again
        let second = advanced(scheduler.run_round().await.unwrap());
        assert_eq!(second.time, t(4.0));
        assert_eq!(second.events.len(), 1);
        assert_eq!(flaky.advances().await, vec![t(4.0), t(4.0)]);
    }

    #[tokio::test]
    async fn test_planners_are_not_scheduled() {
        let planner = Arc::new(ScriptedPeer::new("planner").with_kind(PeerKind::Planner));
        let walker = Arc::new(ScriptedPeer::new("walking").wake_at(2.0));
        let mut scheduler = scheduler(&config(10), vec![planner.clone(), walker]);

        // planners are never scheduled
        advanced(scheduler.run_round().await.unwrap());
        assert!(planner.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_round_advances_to_horizon() {
        let peer = Arc::new(ScriptedPeer::new("user").wake_at(60.0));
        let mut scheduler = scheduler(&config(10), vec![peer.clone()]);

        assert!(matches!(
            scheduler.run_round().await.unwrap(),
            RoundOutcome::Complete
        ));
        let flush = scheduler.flush_round().await.unwrap();
        assert_eq!(flush.time, t(10.0));
        assert_eq!(scheduler.now(), t(10.0));
        assert_eq!(peer.advances().await, vec![t(10.0)]);
        assert_eq!(scheduler.rounds(), 1);
    }
}

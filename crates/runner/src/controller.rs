//! Run controller
//!
//! Owns one run end to end: registration, setup probes, the round loop,
//! the final flush and the terminal status. All run state (registry,
//! clock, reservation table) is scoped to the controller, so several runs
//! can live in one process.
//!
//! ```text
//! INIT ─► SETUP ─► RUNNING ─► FINALIZING ─► DONE
//!           │         │
//!           └────┬────┘
//!                ▼
//!             FAILED
//! ```

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use junction_core::{FailureReason, Peer, PeerId, RunId, RunPhase, RunStatus, SimTime};
use junction_gateway::{GuardedPeer, HealthBoard, connect};
use junction_merge::{MergedEvent, PeerRank};
use junction_ports::PeerAdapter;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::error::{Result, RunError};
use crate::feed::{EventFeed, RoundBatch};
use crate::peers::{PeerEntry, PeerSet};
use crate::registry::PeerRegistry;
use crate::report::{PeerReport, RunReport};
use crate::scheduler::{RoundOutcome, RoundSummary, Scheduler};
use crate::settings::{RunConfig, ScenarioSettings};

/// Requests an abort from outside the controller
///
/// The round in flight drains first; the run then ends `FAILED` with
/// reason `aborted`.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        if !self.tx.send_replace(true) {
            warn!("Abort requested");
        }
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct RunController {
    run_id: RunId,
    config: RunConfig,
    phase: RunPhase,
    status: Option<RunStatus>,
    registry: PeerRegistry,
    peers: PeerSet,
    scheduler: Option<Scheduler>,
    feed: EventFeed,
    abort: AbortHandle,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunController {
    pub fn new(config: RunConfig) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            run_id: Uuid::new_v4(),
            config,
            phase: RunPhase::Init,
            status: None,
            registry: PeerRegistry::new(),
            peers: PeerSet::new(HealthBoard::new()),
            scheduler: None,
            feed: EventFeed::default(),
            abort: AbortHandle { tx: Arc::new(tx) },
            started_at: None,
            finished_at: None,
        }
    }

    /// Build a run from scenario settings, connecting every peer over HTTP
    pub fn from_settings(settings: &ScenarioSettings, client: &reqwest::Client) -> Result<Self> {
        let plan = settings.validate()?;
        let mut controller = Self::new(plan.config);
        for peer in plan.peers {
            let adapter = connect(&peer, client)?;
            controller.register(peer, adapter)?;
        }
        Ok(controller)
    }

    /// Register a peer with the adapter that reaches it
    pub fn register(&mut self, peer: Peer, adapter: Arc<dyn PeerAdapter>) -> Result<PeerRank> {
        let mandatory = peer.mandatory;
        let rank = self.registry.register(peer)?;

        let guard = GuardedPeer::new(
            adapter,
            self.config.retry.clone(),
            self.config.offline_after,
            self.peers.health().clone(),
        );
        self.peers.push(PeerEntry {
            guard: Arc::new(guard),
            rank,
            mandatory,
        });
        Ok(rank)
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn status(&self) -> Option<&RunStatus> {
        self.status.as_ref()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundBatch> {
        self.feed.subscribe()
    }

    /// Merged events released so far
    pub fn events(&self) -> &[MergedEvent] {
        self.scheduler
            .as_ref()
            .map(|s| s.timeline().entries())
            .unwrap_or(&[])
    }

    pub fn now(&self) -> SimTime {
        self.scheduler
            .as_ref()
            .map(Scheduler::now)
            .unwrap_or(self.config.start)
    }

    /// Probe every peer and start the clock
    ///
    /// A mandatory peer failing its probe fails the run; an optional one
    /// is taken offline and the run goes on without it.
    pub async fn setup(&mut self) -> Result<()> {
        self.transition(RunPhase::Setup)?;
        self.started_at = Some(Utc::now());
        info!("Run {}: probing {} peers", self.run_id, self.peers.len());

        let entries: Vec<PeerEntry> = self.peers.iter().cloned().collect();
        let probes = join_all(entries.iter().map(|entry| entry.guard.probe())).await;

        for (entry, result) in entries.iter().zip(probes) {
            let Err(e) = result else { continue };
            if entry.mandatory {
                error!("Mandatory peer {} failed its probe: {}", entry.id(), e);
                let peer = entry.id().clone();
                self.fail(FailureReason::SetupProbeFailed { peer: peer.clone() });
                return Err(RunError::SetupProbeFailed(peer));
            }
            warn!("Optional peer {} failed its probe, continuing without it: {}", entry.id(), e);
            entry.guard.mark_offline();
        }

        self.registry.freeze();
        let scheduler = Scheduler::new(&self.config, self.peers.clone())?;
        self.scheduler = Some(scheduler);
        self.transition(RunPhase::Running)?;
        info!(
            "Run {} running from t={} to horizon {}",
            self.run_id, self.config.start, self.config.horizon
        );
        Ok(())
    }

    /// Time the next round would run at
    pub async fn peek(&self) -> Option<SimTime> {
        match (&self.phase, &self.scheduler) {
            (RunPhase::Running, Some(scheduler)) => scheduler.peek().await,
            _ => None,
        }
    }

    /// Run one round
    ///
    /// Fatal failures move the run to `FAILED` before the error is returned.
    pub async fn step(&mut self) -> Result<RoundOutcome> {
        self.step_until(None).await
    }

    /// Run one round unless it would move the clock past `until`
    pub async fn step_until(&mut self, until: Option<SimTime>) -> Result<RoundOutcome> {
        self.require(RunPhase::Running)?;
        if self.abort.is_aborted() {
            self.fail(FailureReason::Aborted);
            return Err(RunError::Aborted);
        }

        let scheduler = self.running_scheduler()?;
        let outcome = match scheduler.run_round_until(until).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // a mandatory peer dropping out explains any stall it caused
                if let Some(peer) = self.peers.mandatory_offline().cloned() {
                    self.fail(FailureReason::MandatoryPeerOffline { peer: peer.clone() });
                    return Err(RunError::MandatoryPeerOffline(peer));
                }
                if let Some(reason) = e.failure_reason() {
                    self.fail(reason);
                }
                return Err(e);
            }
        };

        if let RoundOutcome::Advanced(summary) = &outcome {
            self.publish(summary);
        }

        if let Some(peer) = self.peers.mandatory_offline().cloned() {
            self.fail(FailureReason::MandatoryPeerOffline { peer: peer.clone() });
            return Err(RunError::MandatoryPeerOffline(peer));
        }
        Ok(outcome)
    }

    /// Advance the run by one unit of work, returning whether more remains
    ///
    /// Sets the run up when it has not started, otherwise runs a round and
    /// finalizes once every peer is quiescent. Stops before any round that
    /// would move the clock past `until`.
    pub async fn proceed(&mut self, until: Option<SimTime>) -> Result<bool> {
        match self.phase {
            RunPhase::Init => match self.setup().await {
                Ok(()) => Ok(true),
                Err(e) if e.failure_reason().is_some() => Ok(false),
                Err(e) => Err(e),
            },
            RunPhase::Running => match self.step_until(until).await {
                Ok(RoundOutcome::Advanced(_)) => Ok(true),
                Ok(RoundOutcome::Paused(next)) => {
                    debug!("Paused at t={} before round at t={}", self.now(), next);
                    Ok(false)
                }
                Ok(RoundOutcome::Complete) => {
                    self.finalize().await?;
                    Ok(false)
                }
                Err(e) if e.failure_reason().is_some() => Ok(false),
                Err(e) => Err(e),
            },
            _ => Ok(false),
        }
    }

    /// Run until the clock reaches `until`, or to completion
    pub async fn run_until(&mut self, until: Option<SimTime>) -> Result<RunReport> {
        while self.proceed(until).await? {}
        Ok(self.report())
    }

    /// Run to completion
    ///
    /// Run failures are reported through the returned report's status;
    /// `Err` is left for misuse and internal faults.
    pub async fn run(&mut self) -> Result<RunReport> {
        self.run_until(None).await
    }

    /// Flush every peer to the horizon and close the event stream
    pub async fn finalize(&mut self) -> Result<()> {
        self.require(RunPhase::Running)?;
        self.transition(RunPhase::Finalizing)?;

        let scheduler = self.running_scheduler()?;
        match scheduler.flush_round().await {
            Ok(summary) => self.publish(&summary),
            Err(e) => error!("Final flush failed: {}", e),
        }

        let online: Vec<PeerEntry> = self.peers.online().cloned().collect();
        let finished = join_all(online.iter().map(|entry| entry.guard.finish())).await;
        for (entry, result) in online.iter().zip(finished) {
            if let Err(e) = result {
                warn!("{} failed to finish: {}", entry.id(), e);
            }
        }

        let offline = self.peers.health().offline();
        if !offline.is_empty() {
            warn!("Run {} finished without {:?}", self.run_id, offline);
        }

        self.transition(RunPhase::Done)?;
        self.status = Some(RunStatus::Done);
        self.finished_at = Some(Utc::now());
        info!("Run {} DONE at t={}", self.run_id, self.now());
        Ok(())
    }

    /// Guarded peers, usable without holding the controller
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Forward a route query to the planner
    pub async fn plan(&self, query: &Value) -> Result<Value> {
        self.peers.plan(query).await
    }

    /// Ask a mobility peer whether it could serve a trip now
    pub async fn reservable(&self, service: &PeerId, org: &str, dst: &str) -> Result<bool> {
        self.registry.resolve(service)?;
        self.peers.reservable(service, org, dst).await
    }

    pub fn report(&self) -> RunReport {
        let health = self.peers.health();
        let peers = self
            .peers
            .iter()
            .map(|entry| PeerReport {
                id: entry.id().clone(),
                kind: entry.kind(),
                mandatory: entry.mandatory,
                health: health.get(entry.id()),
            })
            .collect();

        let (rounds, conflicts, pending) = match &self.scheduler {
            Some(s) => (
                s.rounds(),
                s.coordinator().conflicts().to_vec(),
                s.coordinator().pending().count(),
            ),
            None => (0, Vec::new(), 0),
        };

        RunReport {
            run_id: self.run_id,
            phase: self.phase,
            status: self.status.clone(),
            current_time: self.now(),
            horizon: self.config.horizon,
            rounds,
            events: self.events().len(),
            peers,
            offline: health.offline(),
            degraded: health.degraded(),
            conflicts,
            pending_reservations: pending,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    fn running_scheduler(&mut self) -> Result<&mut Scheduler> {
        let phase = self.phase;
        self.scheduler.as_mut().ok_or(RunError::InvalidPhase {
            expected: RunPhase::Running,
            actual: phase,
        })
    }

    fn publish(&self, summary: &RoundSummary) {
        self.feed.publish(RoundBatch {
            round: summary.index,
            time: summary.time,
            events: summary.events.clone(),
        });
    }

    fn require(&self, expected: RunPhase) -> Result<()> {
        if self.phase != expected {
            return Err(RunError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(RunError::InvalidPhase {
                expected: next,
                actual: self.phase,
            });
        }
        info!("Run {}: {} -> {}", self.run_id, self.phase, next);
        self.phase = next;
        Ok(())
    }

    fn fail(&mut self, reason: FailureReason) {
        if !self.phase.can_transition_to(RunPhase::Failed) {
            warn!("Run {} cannot fail from {}: {}", self.run_id, self.phase, reason);
            return;
        }
        error!("Run {} FAILED: {}", self.run_id, reason);
        self.phase = RunPhase::Failed;
        self.status = Some(RunStatus::Failed(reason));
        self.finished_at = Some(Utc::now());
    }
}

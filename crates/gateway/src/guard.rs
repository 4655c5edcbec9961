//! Guarded peer calls
//!
//! Wraps any [`PeerAdapter`] with the per-call timeout, bounded exponential
//! backoff, health accounting and the idempotent advance cache.

use junction_core::{Event, PeerId, PeerKind, ReservationAnswer, ReservationRequest, SimTime};
use junction_ports::{Delivery, PeerAdapter, PeerError, PeerResult};
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::health::{HealthBoard, PeerHealth};

/// Timeout and retry budget applied to every peer call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Deadline of a single attempt
    pub timeout_ms: u64,
    /// Attempts per call, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Randomize each backoff between half and the full delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        let capped = exp.min(self.max_backoff_ms);
        let millis = if self.jitter && capped > 1 {
            rand::thread_rng().gen_range(capped / 2..=capped)
        } else {
            capped
        };
        Duration::from_millis(millis)
    }
}

/// Result of a guarded advance
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub events: Vec<Event>,
    /// Served from the cache; these events were already handed out
    pub replayed: bool,
}

/// A peer adapter behind the broker's failure policy
pub struct GuardedPeer {
    inner: Arc<dyn PeerAdapter>,
    policy: RetryPolicy,
    offline_after: u32,
    health: HealthBoard,
    /// Highest time advanced to and what the peer returned for it
    advanced: Mutex<Option<(SimTime, Vec<Event>)>>,
}

impl GuardedPeer {
    /// Guard an adapter
    ///
    /// # Arguments
    /// * `inner` - Raw adapter
    /// * `policy` - Timeout and retry budget per call
    /// * `offline_after` - Consecutive failed attempts that take the peer offline
    /// * `health` - Run-wide health board
    pub fn new(
        inner: Arc<dyn PeerAdapter>,
        policy: RetryPolicy,
        offline_after: u32,
        health: HealthBoard,
    ) -> Self {
        Self {
            inner,
            policy,
            offline_after: offline_after.max(1),
            health,
            advanced: Mutex::new(None),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        self.inner.peer_id()
    }

    pub fn kind(&self) -> PeerKind {
        self.inner.kind()
    }

    pub fn health(&self) -> PeerHealth {
        self.health.get(self.peer_id())
    }

    pub fn is_offline(&self) -> bool {
        self.health().is_offline()
    }

    pub fn mark_offline(&self) {
        self.health.mark_offline(self.peer_id());
    }

    /// Highest time this peer has been advanced to
    pub async fn advanced_to(&self) -> Option<SimTime> {
        self.advanced.lock().await.as_ref().map(|(time, _)| *time)
    }

    pub async fn probe(&self) -> PeerResult<()> {
        self.call("probe", || self.inner.probe()).await
    }

    pub async fn peek(&self) -> PeerResult<Option<SimTime>> {
        self.call("peek", || self.inner.peek_next_event_time()).await
    }

    /// Advance the peer to `time`, at most once per time
    ///
    /// A repeat of the last time returns the cached events flagged as
    /// replayed without calling the peer; an earlier time returns nothing.
    pub async fn advance_to(&self, time: SimTime) -> PeerResult<Advance> {
        let mut advanced = self.advanced.lock().await;
        if let Some((last, events)) = advanced.as_ref() {
            if time == *last {
                debug!("{} replaying advance to {}", self.peer_id(), time);
                return Ok(Advance {
                    events: events.clone(),
                    replayed: true,
                });
            }
            if time < *last {
                return Ok(Advance {
                    events: Vec::new(),
                    replayed: true,
                });
            }
        }

        let events = self.call("advance", || self.inner.advance_to(time)).await?;
        *advanced = Some((time, events.clone()));
        Ok(Advance {
            events,
            replayed: false,
        })
    }

    pub async fn deliver(&self, event: &Event) -> PeerResult<Delivery> {
        self.call("deliver", || self.inner.deliver(event)).await
    }

    pub async fn reserve(&self, request: &ReservationRequest) -> PeerResult<ReservationAnswer> {
        self.call("reserve", || self.inner.reserve(request)).await
    }

    pub async fn reservable(&self, org: &str, dst: &str) -> PeerResult<bool> {
        self.call("reservable", || self.inner.reservable(org, dst)).await
    }

    pub async fn plan(&self, query: &Value) -> PeerResult<Value> {
        self.call("plan", || self.inner.plan(query)).await
    }

    pub async fn flush(&self) -> PeerResult<()> {
        self.call("flush", || self.inner.flush()).await
    }

    pub async fn finish(&self) -> PeerResult<()> {
        self.call("finish", || self.inner.finish()).await
    }

    /// Run one call under the timeout and retry budget
    ///
    /// Every failed attempt counts against the peer's health. Protocol
    /// errors are never retried.
    async fn call<T, F, Fut>(&self, operation: &'static str, mut attempt_call: F) -> PeerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PeerResult<T>>,
    {
        let peer = self.peer_id();
        let mut attempt = 0;

        loop {
            if self.is_offline() {
                return Err(PeerError::Offline(peer.clone()));
            }
            attempt += 1;

            let timeout = self.policy.timeout();
            let result = match tokio::time::timeout(timeout, attempt_call()).await {
                Ok(result) => result,
                Err(_) => Err(PeerError::Timeout(timeout)),
            };

            let err = match result {
                Ok(value) => {
                    self.health.record_success(peer);
                    return Ok(value);
                }
                Err(err) if !err.counts_as_failure() => return Err(err),
                Err(err) => err,
            };

            let health = self.health.record_failure(peer, self.offline_after);
            warn!(
                "{} {} failed (attempt {}/{}): {}",
                peer, operation, attempt, self.policy.max_attempts, err
            );

            if health.is_offline() || !err.is_transient() || attempt >= self.policy.max_attempts {
                return Err(err);
            }
            tokio::time::sleep(self.policy.backoff(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::{Fault, Operation, ScriptedPeer};
    use junction_core::EventKind;
    use serde_json::json;

    fn t(v: f64) -> SimTime {
        SimTime::new(v).unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout_ms: 50,
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
            jitter: false,
        }
    }

    fn guard(peer: Arc<ScriptedPeer>, offline_after: u32) -> GuardedPeer {
        GuardedPeer::new(peer, policy(), offline_after, HealthBoard::new())
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(30), Duration::from_millis(40));

        let jittered = RetryPolicy {
            jitter: true,
            ..policy
        };
        let delay = jittered.backoff(3);
        assert!(delay >= Duration::from_millis(20) && delay <= Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let peer = Arc::new(
            ScriptedPeer::new("walking")
                .wake_at(4.0)
                .with_faults(Operation::Peek, 2, Fault::Fail(PeerError::Transient("reset".into()))),
        );
        let guarded = guard(peer.clone(), 3);

        assert_eq!(guarded.peek().await.unwrap(), Some(t(4.0)));
        assert_eq!(guarded.health(), PeerHealth::Healthy);
        assert_eq!(peer.calls().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_timeouts_take_peer_offline() {
        let peer = Arc::new(ScriptedPeer::new("P4").wake_at(2.0).with_faults(
            Operation::Peek,
            3,
            Fault::Stall(Duration::from_secs(60)),
        ));
        let guarded = guard(peer, 3);

        let err = guarded.peek().await.unwrap_err();
        assert_eq!(err, PeerError::Timeout(Duration::from_millis(50)));
        assert!(guarded.is_offline());

        // offline peers are not called again
        assert_eq!(
            guarded.peek().await,
            Err(PeerError::Offline(PeerId::from("P4")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_error_degrades_without_retry() {
        let peer = Arc::new(ScriptedPeer::new("ondemand").with_faults(
            Operation::Advance,
            1,
            Fault::Fail(PeerError::Protocol("bad json".into())),
        ));
        let guarded = guard(peer.clone(), 3);

        assert!(matches!(
            guarded.advance_to(t(1.0)).await,
            Err(PeerError::Protocol(_))
        ));
        assert_eq!(
            guarded.health(),
            PeerHealth::Degraded {
                consecutive_failures: 1
            }
        );
        assert_eq!(peer.advances().await.len(), 1);
    }

    #[tokio::test]
    async fn test_advance_is_idempotent() {
        let peer = Arc::new(
            ScriptedPeer::new("P1")
                .emit(5.0, EventKind::Departure, json!({"userId": "U1"}))
                .emit(8.0, EventKind::Arrival, json!({"userId": "U1"})),
        );
        let guarded = guard(peer.clone(), 3);

        let first = guarded.advance_to(t(5.0)).await.unwrap();
        assert!(!first.replayed);
        let again = guarded.advance_to(t(5.0)).await.unwrap();
        assert!(again.replayed);
        assert_eq!(first.events, again.events);

        let earlier = guarded.advance_to(t(3.0)).await.unwrap();
        assert!(earlier.events.is_empty());

        // the peer itself saw a single advance to 5
        assert_eq!(peer.advances().await, vec![t(5.0)]);
        assert_eq!(guarded.advanced_to().await, Some(t(5.0)));
    }

    #[tokio::test]
    async fn test_unsupported_does_not_count_as_failure() {
        let guarded = guard(Arc::new(ScriptedPeer::new("walking")), 1);
        assert!(matches!(
            guarded.plan(&json!({})).await,
            Err(PeerError::Unsupported { .. })
        ));
        assert_eq!(guarded.health(), PeerHealth::Healthy);
    }
}

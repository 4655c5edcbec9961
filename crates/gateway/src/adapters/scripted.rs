//! In-process peer driven by a fixed script
//!
//! Used for dry runs and tests: emits pre-scheduled events, answers
//! bookings through a closure, can inject faults per operation, and
//! records every call it receives.

use async_trait::async_trait;
use junction_core::{
    Event, EventKind, PeerId, PeerKind, ReservationAnswer, ReservationRequest, SimTime,
};
use junction_ports::{Delivery, PeerAdapter, PeerError, PeerResult};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

/// Operation a fault is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Probe,
    Peek,
    Advance,
    Deliver,
    Reserve,
}

/// Injected misbehaviour for one call
#[derive(Debug, Clone)]
pub enum Fault {
    Fail(PeerError),
    /// Sleep before answering normally
    Stall(Duration),
}

/// Call received by a scripted peer
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Probe,
    Peek(Option<SimTime>),
    Advance(SimTime),
    Deliver(Event),
    Reserve(ReservationRequest),
    Flush,
    Finish,
}

type Answer = Box<dyn Fn(&ReservationRequest) -> ReservationAnswer + Send + Sync>;

#[derive(Clone)]
struct Planned {
    kind: EventKind,
    target: Option<PeerId>,
    payload: Map<String, Value>,
}

#[derive(Default)]
struct Script {
    /// Not yet emitted, keyed by time
    pending: BTreeMap<SimTime, Vec<Planned>>,
    last_advance: Option<(SimTime, Vec<Event>)>,
    faults: HashMap<Operation, VecDeque<Fault>>,
    calls: Vec<Call>,
}

pub struct ScriptedPeer {
    id: PeerId,
    kind: PeerKind,
    answer: Answer,
    script: Mutex<Script>,
}

impl ScriptedPeer {
    /// Create a scripted simulator peer with an empty script
    ///
    /// Booking requests are confirmed on the hinted resource (or one named
    /// after the commuter) for the requested window.
    pub fn new(id: impl Into<PeerId>) -> Self {
        Self {
            id: id.into(),
            kind: PeerKind::HttpSimulator,
            answer: Box::new(|request| {
                let resource = request
                    .resource_hint
                    .clone()
                    .unwrap_or_else(|| format!("vehicle-{}", request.commuter_id));
                ReservationAnswer::confirmed(resource, request.window)
            }),
            script: Mutex::new(Script::default()),
        }
    }

    pub fn with_kind(mut self, kind: PeerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Emit a broadcast event at `time`
    pub fn emit(self, time: f64, kind: EventKind, payload: Value) -> Self {
        self.plan(time, kind, None, payload)
    }

    /// Emit an event addressed to a single peer at `time`
    pub fn emit_to(self, time: f64, kind: EventKind, target: &str, payload: Value) -> Self {
        self.plan(time, kind, Some(PeerId::from(target)), payload)
    }

    /// Report `time` as pending without emitting anything there
    pub fn wake_at(mut self, time: f64) -> Self {
        if let Some(time) = SimTime::new(time) {
            self.script.get_mut().pending.entry(time).or_default();
        }
        self
    }

    /// Queue `count` identical faults for an operation
    pub fn with_faults(mut self, operation: Operation, count: usize, fault: Fault) -> Self {
        let queue = self.script.get_mut().faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(fault, count));
        self
    }

    /// Replace the booking policy
    pub fn with_answers(
        mut self,
        answer: impl Fn(&ReservationRequest) -> ReservationAnswer + Send + Sync + 'static,
    ) -> Self {
        self.answer = Box::new(answer);
        self
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<Call> {
        self.script.lock().await.calls.clone()
    }

    /// Times passed to `advance_to`, in order
    pub async fn advances(&self) -> Vec<SimTime> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                Call::Advance(time) => Some(time),
                _ => None,
            })
            .collect()
    }

    /// Events handed to this peer, in order
    pub async fn delivered(&self) -> Vec<Event> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                Call::Deliver(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn plan(mut self, time: f64, kind: EventKind, target: Option<PeerId>, payload: Value) -> Self {
        if let Some(time) = SimTime::new(time) {
            let payload = match payload {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            self.script
                .get_mut()
                .pending
                .entry(time)
                .or_default()
                .push(Planned {
                    kind,
                    target,
                    payload,
                });
        }
        self
    }

    /// Record the call and apply the next queued fault, if any
    async fn enter(&self, operation: Operation, call: Call) -> PeerResult<()> {
        let fault = {
            let mut script = self.script.lock().await;
            script.calls.push(call);
            script
                .faults
                .get_mut(&operation)
                .and_then(VecDeque::pop_front)
        };

        match fault {
            Some(Fault::Fail(err)) => Err(err),
            Some(Fault::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PeerAdapter for ScriptedPeer {
    fn peer_id(&self) -> &PeerId {
        &self.id
    }

    fn kind(&self) -> PeerKind {
        self.kind
    }

    async fn probe(&self) -> PeerResult<()> {
        self.enter(Operation::Probe, Call::Probe).await
    }

    async fn peek_next_event_time(&self) -> PeerResult<Option<SimTime>> {
        let next = self.script.lock().await.pending.keys().next().copied();
        self.enter(Operation::Peek, Call::Peek(next)).await?;
        Ok(next)
    }

    async fn advance_to(&self, time: SimTime) -> PeerResult<Vec<Event>> {
        self.enter(Operation::Advance, Call::Advance(time)).await?;

        let mut script = self.script.lock().await;
        if let Some((last, events)) = &script.last_advance {
            if *last == time {
                return Ok(events.clone());
            }
        }

        let due: Vec<SimTime> = script.pending.range(..=time).map(|(at, _)| *at).collect();
        let mut events = Vec::new();
        for at in due {
            for planned in script.pending.remove(&at).unwrap_or_default() {
                let mut event = Event::new(at, self.id.clone(), planned.kind, planned.payload);
                event.target = planned.target;
                events.push(event);
            }
        }
        script.last_advance = Some((time, events.clone()));
        Ok(events)
    }

    async fn deliver(&self, event: &Event) -> PeerResult<Delivery> {
        self.enter(Operation::Deliver, Call::Deliver(event.clone()))
            .await?;
        Ok(Delivery::Ack)
    }

    async fn reserve(&self, request: &ReservationRequest) -> PeerResult<ReservationAnswer> {
        self.enter(Operation::Reserve, Call::Reserve(request.clone()))
            .await?;
        Ok((self.answer)(request))
    }

    async fn reservable(&self, _org: &str, _dst: &str) -> PeerResult<bool> {
        Ok(true)
    }

    async fn plan(&self, query: &Value) -> PeerResult<Value> {
        if self.kind != PeerKind::Planner {
            return Err(PeerError::Unsupported {
                kind: self.kind,
                operation: "plan",
            });
        }
        Ok(serde_json::json!({ "routes": [], "query": query }))
    }

    async fn flush(&self) -> PeerResult<()> {
        self.script.lock().await.calls.push(Call::Flush);
        Ok(())
    }

    async fn finish(&self) -> PeerResult<()> {
        self.script.lock().await.calls.push(Call::Finish);
        Ok(())
    }
}

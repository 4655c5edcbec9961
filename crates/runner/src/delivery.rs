//! Fan-out of merged events to peers
//!
//! Events go out one at a time in merge order; each event is handed to
//! all of its recipients concurrently before the next one is sent.

use futures_util::future::join_all;
use junction_core::{Event, EventKind, PeerKind};
use junction_merge::MergedEvent;
use junction_ports::Delivery;
use log::{debug, info, warn};

use crate::peers::{PeerEntry, PeerSet};

/// Counters of one round's delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub acked: usize,
    pub nacked: usize,
    pub failed: usize,
}

/// Peers that receive `event`
///
/// Writers get every event. A targeted event otherwise goes to its target
/// only; a broadcast goes to every online receiving peer except its
/// source. Booking requests reach the mobility peer through `reserve`,
/// so they are not delivered to it a second time.
pub fn recipients<'a>(peers: &'a PeerSet, event: &Event) -> Vec<&'a PeerEntry> {
    peers
        .online()
        .filter(|entry| {
            let kind = entry.kind();
            if kind == PeerKind::BrokerWriter {
                return true;
            }
            if !kind.receives_events() {
                return false;
            }
            match &event.target {
                Some(_) if event.kind == EventKind::ReservationRequest => false,
                Some(target) => target == entry.id(),
                None => entry.id() != &event.source,
            }
        })
        .collect()
}

/// Deliver a round's merged events, then flush every recipient
pub async fn deliver_round(peers: &PeerSet, events: &[MergedEvent]) -> DeliveryStats {
    let mut stats = DeliveryStats::default();

    for merged in events {
        if let Ok(line) = serde_json::to_string(merged) {
            info!(target: "events", "{}", line);
        }

        let targets = recipients(peers, &merged.event);
        if targets.is_empty() {
            debug!(
                "Event #{} {} from {} has no recipients",
                merged.seqno, merged.event.kind, merged.event.source
            );
            continue;
        }

        let results = join_all(
            targets
                .iter()
                .map(|entry| entry.guard.deliver(&merged.event)),
        )
        .await;

        for (entry, result) in targets.iter().zip(results) {
            match result {
                Ok(Delivery::Ack) => stats.acked += 1,
                Ok(Delivery::Nack(reason)) => {
                    debug!("{} refused event #{}: {}", entry.id(), merged.seqno, reason);
                    stats.nacked += 1;
                }
                Err(e) => {
                    warn!("Delivering event #{} to {} failed: {}", merged.seqno, entry.id(), e);
                    stats.failed += 1;
                }
            }
        }
    }

    let receiving: Vec<&PeerEntry> = peers
        .online()
        .filter(|entry| entry.kind().receives_events())
        .collect();
    let flushed = join_all(receiving.iter().map(|entry| entry.guard.flush())).await;
    for (entry, result) in receiving.iter().zip(flushed) {
        if let Err(e) = result {
            warn!("Flushing {} failed: {}", entry.id(), e);
        }
    }

    stats
}

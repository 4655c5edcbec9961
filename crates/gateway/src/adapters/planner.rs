//! Route planner peer adapter
//!
//! Planners are queried, never scheduled: they report no pending time and
//! emit no events.

use async_trait::async_trait;
use junction_core::{Event, Peer, PeerId, PeerKind, SimTime};
use junction_ports::{Delivery, PeerAdapter, PeerResult};
use reqwest::Client;
use serde_json::Value;

use crate::client::HttpClient;
use crate::error::GatewayError;
use crate::routes::Routes;

pub struct PlannerPeer {
    id: PeerId,
    details: Value,
    client: HttpClient,
}

impl PlannerPeer {
    pub fn new(peer: &Peer, client: Client) -> Result<Self, GatewayError> {
        Ok(Self {
            id: peer.id.clone(),
            details: Value::Object(peer.details.clone()),
            client: HttpClient::new(client, &peer.endpoint)?,
        })
    }
}

#[async_trait]
impl PeerAdapter for PlannerPeer {
    fn peer_id(&self) -> &PeerId {
        &self.id
    }

    fn kind(&self) -> PeerKind {
        PeerKind::Planner
    }

    async fn probe(&self) -> PeerResult<()> {
        self.client.post_ack(Routes::SETUP, &self.details).await?;
        Ok(())
    }

    async fn peek_next_event_time(&self) -> PeerResult<Option<SimTime>> {
        Ok(None)
    }

    async fn advance_to(&self, _time: SimTime) -> PeerResult<Vec<Event>> {
        Ok(Vec::new())
    }

    async fn deliver(&self, _event: &Event) -> PeerResult<Delivery> {
        Ok(Delivery::Nack("planners do not consume events".into()))
    }

    async fn plan(&self, query: &Value) -> PeerResult<Value> {
        Ok(self.client.post(Routes::PLAN, query).await?)
    }
}

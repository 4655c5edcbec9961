//! Simulator peer adapter
//!
//! Drives mobility simulators, demand generators, user models and
//! evaluators through the shared peer protocol.

use async_trait::async_trait;
use junction_core::{Event, Peer, PeerId, PeerKind, ReservationAnswer, ReservationRequest, SimTime};
use junction_ports::{Delivery, PeerAdapter, PeerResult};
use log::debug;
use reqwest::Client;
use serde_json::Value;

use crate::client::HttpClient;
use crate::error::GatewayError;
use crate::messages::{
    AdvanceRequest, AdvanceResponse, BookingRequest, PeekResponse, ReservableResponse, WireEvent,
};
use crate::routes::Routes;

/// Peers usually answer a delivery with an empty body, which is an ack.
/// Anything else must be a well-formed delivery answer.
fn parse_delivery(body: &str) -> Result<Delivery, GatewayError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Delivery::Ack);
    }
    serde_json::from_str(body)
        .map_err(|e| GatewayError::Decode(format!("delivery answer {:?}: {}", body, e)))
}

pub struct HttpPeer {
    id: PeerId,
    details: Value,
    client: HttpClient,
}

impl HttpPeer {
    /// Create an adapter for a configured simulator peer
    ///
    /// # Arguments
    /// * `peer` - Registered peer; its details are sent at setup
    /// * `client` - Shared HTTP connection pool
    pub fn new(peer: &Peer, client: Client) -> Result<Self, GatewayError> {
        Ok(Self {
            id: peer.id.clone(),
            details: Value::Object(peer.details.clone()),
            client: HttpClient::new(client, &peer.endpoint)?,
        })
    }
}

#[async_trait]
impl PeerAdapter for HttpPeer {
    fn peer_id(&self) -> &PeerId {
        &self.id
    }

    fn kind(&self) -> PeerKind {
        PeerKind::HttpSimulator
    }

    async fn probe(&self) -> PeerResult<()> {
        self.client.post_ack(Routes::SETUP, &self.details).await?;
        Ok(())
    }

    async fn peek_next_event_time(&self) -> PeerResult<Option<SimTime>> {
        let resp: PeekResponse = self.client.get(Routes::PEEK).await?;
        Ok(resp.into_time()?)
    }

    async fn advance_to(&self, time: SimTime) -> PeerResult<Vec<Event>> {
        let resp: AdvanceResponse = self
            .client
            .post(Routes::ADVANCE, &AdvanceRequest { time })
            .await?;
        debug!("{} advanced to {}: {} events", self.id, time, resp.events.len());

        let events = resp
            .events
            .into_iter()
            .map(|wire| wire.into_event(&self.id, time))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn deliver(&self, event: &Event) -> PeerResult<Delivery> {
        let body = self
            .client
            .post_ack(Routes::TRIGGERED, &WireEvent::from(event))
            .await?;
        Ok(parse_delivery(&body)?)
    }

    async fn reserve(&self, request: &ReservationRequest) -> PeerResult<ReservationAnswer> {
        let answer = self
            .client
            .post(Routes::RESERVATIONS, &BookingRequest::from(request))
            .await?;
        Ok(answer)
    }

    async fn reservable(&self, org: &str, dst: &str) -> PeerResult<bool> {
        let resp: ReservableResponse = self.client.get(&Routes::reservable(org, dst)).await?;
        Ok(resp.reservable)
    }

    async fn finish(&self) -> PeerResult<()> {
        self.client.post_ack(Routes::FINISH, &Value::Null).await?;
        Ok(())
    }
}

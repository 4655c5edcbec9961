//! Result writer peer adapter
//!
//! Receives every merged event and uploads them in `{seqno, data}` batches
//! to the writer's `/result/events/` route.

use async_trait::async_trait;
use junction_core::{Event, Peer, PeerId, PeerKind, SimTime};
use junction_ports::{Delivery, PeerAdapter, PeerResult};
use log::{debug, warn};
use reqwest::Client;
use tokio::sync::Mutex;

use crate::client::HttpClient;
use crate::error::GatewayError;
use crate::messages::LogRecord;
use crate::routes::Routes;

/// Events buffered before an upload is forced mid-round
pub const DEFAULT_BATCH_SIZE: usize = 500;

struct Buffer {
    records: Vec<LogRecord>,
    next_seqno: u64,
}

pub struct WriterPeer {
    id: PeerId,
    client: HttpClient,
    batch_size: usize,
    buffer: Mutex<Buffer>,
}

impl WriterPeer {
    pub fn new(peer: &Peer, client: Client) -> Result<Self, GatewayError> {
        Ok(Self {
            id: peer.id.clone(),
            client: HttpClient::new(client, &peer.endpoint)?,
            batch_size: DEFAULT_BATCH_SIZE,
            buffer: Mutex::new(Buffer {
                records: Vec::new(),
                next_seqno: 0,
            }),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Upload everything buffered; on failure the batch stays queued
    async fn upload(&self, buffer: &mut Buffer) -> PeerResult<()> {
        if buffer.records.is_empty() {
            return Ok(());
        }
        self.client
            .post_ack(Routes::RESULT_EVENTS, &buffer.records)
            .await?;
        debug!("{} uploaded {} events", self.id, buffer.records.len());
        buffer.records.clear();
        Ok(())
    }
}

#[async_trait]
impl PeerAdapter for WriterPeer {
    fn peer_id(&self) -> &PeerId {
        &self.id
    }

    fn kind(&self) -> PeerKind {
        PeerKind::BrokerWriter
    }

    async fn probe(&self) -> PeerResult<()> {
        // An empty batch checks the route without writing anything
        self.client
            .post_ack(Routes::RESULT_EVENTS, &Vec::<LogRecord>::new())
            .await?;
        Ok(())
    }

    async fn peek_next_event_time(&self) -> PeerResult<Option<SimTime>> {
        Ok(None)
    }

    async fn advance_to(&self, _time: SimTime) -> PeerResult<Vec<Event>> {
        Ok(Vec::new())
    }

    async fn deliver(&self, event: &Event) -> PeerResult<Delivery> {
        let mut buffer = self.buffer.lock().await;
        let seqno = buffer.next_seqno;
        buffer.next_seqno += 1;
        buffer.records.push(LogRecord {
            seqno,
            data: event.clone(),
        });

        // The event is already queued, so a failed upload is left to the next flush
        if buffer.records.len() >= self.batch_size {
            if let Err(e) = self.upload(&mut buffer).await {
                warn!("{} upload deferred: {}", self.id, e);
            }
        }
        Ok(Delivery::Ack)
    }

    async fn flush(&self) -> PeerResult<()> {
        let mut buffer = self.buffer.lock().await;
        self.upload(&mut buffer).await
    }

    async fn finish(&self) -> PeerResult<()> {
        self.flush().await
    }
}

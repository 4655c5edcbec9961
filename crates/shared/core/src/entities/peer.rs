use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier of a configured peer (the name used in the scenario settings)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

/// Source name of events the broker itself emits
pub const BROKER_PEER: &str = "broker";

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn broker() -> Self {
        Self(BROKER_PEER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for PeerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Protocol family a peer speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerKind {
    /// Mobility simulator, demand generator, user model or evaluator driven over HTTP
    HttpSimulator,
    /// Route planner (queried, never scheduled)
    Planner,
    /// Result writer receiving the merged event stream
    BrokerWriter,
}

impl PeerKind {
    /// Whether the scheduler polls this peer for event times
    pub fn is_scheduled(&self) -> bool {
        matches!(self, PeerKind::HttpSimulator)
    }

    /// Whether merged events are delivered to this peer
    pub fn receives_events(&self) -> bool {
        matches!(self, PeerKind::HttpSimulator | PeerKind::BrokerWriter)
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerKind::HttpSimulator => "http-simulator",
            PeerKind::Planner => "planner",
            PeerKind::BrokerWriter => "broker-writer",
        };
        f.write_str(name)
    }
}

/// A configured peer. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub kind: PeerKind,
    /// Base URI of the peer's HTTP interface
    pub endpoint: String,
    /// Opaque configuration passed through to the peer at setup
    #[serde(default)]
    pub details: Map<String, Value>,
    /// A mandatory peer going offline fails the whole run
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, kind: PeerKind, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            endpoint: endpoint.into(),
            details: Map::new(),
            mandatory: true,
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }
}

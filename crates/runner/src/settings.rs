//! Scenario settings
//!
//! The broker is configured with one JSON mapping from peer name to peer
//! settings, in declaration order:
//!
//! ```json
//! {
//!   "broker":   {"type": "broker", "details": {"horizon": 1440, "writer": {"endpoint": "http://localhost:8080"}}},
//!   "planner":  {"type": "planner", "endpoint": "http://localhost:8001"},
//!   "user":     {"type": "http", "endpoint": "http://localhost:8002", "details": {"seed": 7}},
//!   "ondemand": {"type": "http", "endpoint": "http://localhost:8003", "mandatory": false}
//! }
//! ```
//!
//! Peer `details` are passed through untouched. Only the broker's own
//! entry has a schema, and it is checked strictly at setup.

use indexmap::IndexMap;
use junction_clock::StepMode;
use junction_core::{Peer, PeerKind, SimTime};
use junction_gateway::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::SettingsError;

/// Settings of one simulator or planner peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSetting {
    pub endpoint: String,
    #[serde(default = "empty_details")]
    pub details: Value,
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
    /// Lower merges first on time ties; declaration order breaks ties
    #[serde(default)]
    pub priority: Option<i64>,
}

fn empty_details() -> Value {
    Value::Object(Map::new())
}

fn default_mandatory() -> bool {
    true
}

/// Where the merged event log is uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriterSetting {
    pub endpoint: String,
}

/// The broker's own entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerDetails {
    /// Terminal simulation time, in minutes
    pub horizon: f64,
    #[serde(default)]
    pub start: f64,
    /// Fixed increment in minutes; event-driven when absent
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Consecutive failures before a peer goes offline (defaults to `retry.max_attempts`)
    #[serde(default)]
    pub offline_after: Option<u32>,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u64,
    #[serde(default)]
    pub writer: Option<WriterSetting>,
}

fn default_max_rounds() -> u64 {
    RunConfig::default().max_rounds
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSetting {
    pub details: BrokerDetails,
}

/// One entry of the settings mapping, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PeerSetting {
    Http(EndpointSetting),
    Planner(EndpointSetting),
    Broker(BrokerSetting),
}

/// Runtime parameters of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub start: SimTime,
    pub horizon: SimTime,
    pub step_mode: StepMode,
    pub retry: RetryPolicy,
    pub offline_after: u32,
    /// Rounds after which the horizon is declared unreachable
    pub max_rounds: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            start: SimTime::ZERO,
            horizon: SimTime::from(1440),
            step_mode: StepMode::EventDriven,
            offline_after: retry.max_attempts,
            retry,
            max_rounds: 100_000,
        }
    }
}

/// Validated settings: run parameters and peers in rank order
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub config: RunConfig,
    pub peers: Vec<Peer>,
}

/// Name of the peer created from the broker's `writer` entry
pub const WRITER_PEER: &str = "writer";

/// Root scenario settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioSettings {
    pub peers: IndexMap<String, PeerSetting>,
}

impl ScenarioSettings {
    /// Load settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| SettingsError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(json).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Parse settings from an already decoded JSON value
    pub fn from_value(value: Value) -> Result<Self, SettingsError> {
        serde_json::from_value(value).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Validate and turn the settings into a run plan
    ///
    /// Peers are ranked by `priority` (unset counts as 0), then by
    /// declaration order. The writer, if any, ranks last.
    pub fn validate(&self) -> Result<RunPlan, SettingsError> {
        let mut broker: Option<(&String, &BrokerDetails)> = None;
        let mut peers: Vec<(i64, Peer)> = Vec::new();

        for (name, setting) in &self.peers {
            match setting {
                PeerSetting::Broker(BrokerSetting { details }) => {
                    if broker.is_some() {
                        return Err(SettingsError::DuplicateBroker(name.clone()));
                    }
                    broker = Some((name, details));
                }
                PeerSetting::Http(endpoint) => {
                    peers.push(endpoint_peer(name, PeerKind::HttpSimulator, endpoint)?);
                }
                PeerSetting::Planner(endpoint) => {
                    peers.push(endpoint_peer(name, PeerKind::Planner, endpoint)?);
                }
            }
        }

        let (_, details) = broker.ok_or(SettingsError::MissingBroker)?;
        let config = run_config(details)?;

        // stable: equal priorities keep declaration order
        peers.sort_by_key(|(priority, _)| *priority);
        let mut peers: Vec<Peer> = peers.into_iter().map(|(_, peer)| peer).collect();

        if let Some(writer) = &details.writer {
            check_endpoint(WRITER_PEER, &writer.endpoint)?;
            peers.push(
                Peer::new(WRITER_PEER, PeerKind::BrokerWriter, writer.endpoint.clone()).optional(),
            );
        }

        Ok(RunPlan { config, peers })
    }
}

fn endpoint_peer(
    name: &str,
    kind: PeerKind,
    setting: &EndpointSetting,
) -> Result<(i64, Peer), SettingsError> {
    check_endpoint(name, &setting.endpoint)?;
    let details = match &setting.details {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => return Err(SettingsError::InvalidDetails(name.to_string())),
    };

    let mut peer = Peer::new(name, kind, setting.endpoint.clone()).with_details(details);
    peer.mandatory = setting.mandatory;
    Ok((setting.priority.unwrap_or(0), peer))
}

fn check_endpoint(name: &str, endpoint: &str) -> Result<(), SettingsError> {
    url::Url::parse(endpoint)
        .map(|_| ())
        .map_err(|e| SettingsError::InvalidEndpoint {
            peer: name.to_string(),
            error: e.to_string(),
        })
}

fn run_config(details: &BrokerDetails) -> Result<RunConfig, SettingsError> {
    let horizon = SimTime::new(details.horizon)
        .filter(|h| h.minutes() >= 0.0)
        .ok_or(SettingsError::InvalidHorizon(details.horizon))?;
    let start = SimTime::new(details.start)
        .filter(|s| *s <= horizon)
        .ok_or(SettingsError::InvalidHorizon(details.horizon))?;

    let step_mode = match details.step {
        None => StepMode::EventDriven,
        Some(step) if step.is_finite() && step > 0.0 => StepMode::FixedIncrement { step },
        Some(step) => return Err(SettingsError::InvalidStep(step)),
    };

    if details.retry.max_attempts == 0 {
        return Err(SettingsError::InvalidRetry("max_attempts must be at least 1".into()));
    }
    if details.retry.timeout_ms == 0 {
        return Err(SettingsError::InvalidRetry("timeout_ms must be positive".into()));
    }

    Ok(RunConfig {
        start,
        horizon,
        step_mode,
        offline_after: details
            .offline_after
            .unwrap_or(details.retry.max_attempts)
            .max(1),
        retry: details.retry.clone(),
        max_rounds: details.max_rounds,
    })
}

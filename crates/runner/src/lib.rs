//! Junction Runner - Simulation broker orchestration
//!
//! Drives one simulation run across independently operated peers:
//!
//! - **Settings**: scenario settings parsed and validated into a run plan
//! - **Registry**: configured peers and their fixed merge ranks
//! - **Scheduler**: conservative time-stepped rounds over the guarded peers
//! - **Controller**: run lifecycle, setup probes, final flush, abort
//! - **Feed**: live stream of merged rounds for observers
//!
//! ## Architecture
//!
//! ```text
//!                  ┌─────────────────────┐
//!                  │   RunController     │  INIT → SETUP → RUNNING → FINALIZING → DONE
//!                  └──────────┬──────────┘
//!                             │ step
//!                  ┌──────────▼──────────┐
//!                  │     Scheduler       │── SimulationClock
//!                  └──┬───────┬───────┬──┘
//!              peek / │       │       │ deliver
//!             advance │  MergeQueue   │
//!                     │       │       │
//!                     │  Reservation  │
//!                     │  Coordinator  │
//!                     ▼               ▼
//!               ┌──────────────────────────┐
//!               │  GuardedPeer (gateway)   │
//!               └────────────┬─────────────┘
//!                            │ HTTP
//!       user models · mobility simulators · planner · result writer
//! ```

pub mod controller;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod peers;
pub mod registry;
pub mod reservations;
pub mod report;
pub mod scheduler;
pub mod settings;

// Re-export main types
pub use controller::{AbortHandle, RunController};
pub use delivery::DeliveryStats;
pub use error::{RegistryError, Result, RunError, SettingsError};
pub use feed::{EventFeed, RoundBatch};
pub use peers::{PeerEntry, PeerSet};
pub use registry::PeerRegistry;
pub use report::{PeerReport, RunReport};
pub use scheduler::{RoundOutcome, RoundSummary, Scheduler};
pub use settings::{RunConfig, RunPlan, ScenarioSettings, WRITER_PEER};

//! Junction Gateway
//!
//! Adapter layer between the broker and its peers. Provides:
//! - Peer adapters per protocol (simulator, planner, result writer, scripted)
//! - Wire message types for the peer HTTP protocol
//! - `GuardedPeer`: timeout, retry with backoff, idempotent advance, health
//!
//! ## Architecture
//!
//! ```text
//!     Scheduler / Run controller
//!              │
//!       ┌──────▼──────┐
//!       │ GuardedPeer │  timeout, retry, advance cache
//!       └──────┬──────┘     │
//!              │            └──► HealthBoard
//!       ┌──────▼──────┐
//!       │ PeerAdapter │  http │ planner │ writer │ scripted
//!       └──────┬──────┘
//!              │ /setup /peek /advance /triggered /reservations /finish
//!        External peers
//! ```

pub mod adapters;
pub mod client;
pub mod error;
pub mod guard;
pub mod health;
pub mod messages;
pub mod routes;

// Re-export commonly used types
pub use adapters::{
    Call, Fault, HttpPeer, Operation, PlannerPeer, ScriptedPeer, WriterPeer, connect,
};
pub use error::GatewayError;
pub use guard::{Advance, GuardedPeer, RetryPolicy};
pub use health::{HealthBoard, PeerHealth};
pub use routes::Routes;

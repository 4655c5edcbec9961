//! Junction Server - HTTP control surface of the simulation broker
//!
//! Serves one run at a time:
//!
//! - `POST /setup` configures a run from scenario settings
//! - `POST /start`, `/step`, `/run?until=`, `/abort`, `/finish` drive it
//! - `GET /peek`, `/status`, `/events` observe it
//! - `POST /plan`, `GET /reservable` pass queries through to the peers

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;

pub use error::ApiError;
pub use router::{AppState, RunSlot, create_router};

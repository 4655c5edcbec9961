//! Junction Clock Infrastructure
//!
//! The run owns exactly one [`SimulationClock`]. The scheduler holds it
//! mutably and is the only writer; every other component reads time
//! through a [`ClockHandle`].
//!
//! ## Usage
//!
//! ```ignore
//! use junction_clock::{SimulationClock, StepMode};
//! use junction_core::SimTime;
//!
//! let mut clock = SimulationClock::new(SimTime::ZERO, SimTime::from(600), StepMode::EventDriven)?;
//! let reader = clock.subscribe();
//!
//! if let Some(target) = clock.next_target(Some(SimTime::from(5))) {
//!     clock.advance(target)?;
//! }
//! assert_eq!(reader.now(), SimTime::from(5));
//! ```

mod error;
mod handle;
mod simulation;

pub use error::ClockError;
pub use handle::ClockHandle;
pub use simulation::{SimulationClock, StepMode};

// Re-export the Clock trait for convenience
pub use junction_ports::Clock;

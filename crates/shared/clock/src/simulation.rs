use junction_core::SimTime;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ClockError;
use crate::handle::ClockHandle;

/// How the scheduler picks the next global time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum StepMode {
    /// Jump straight to the earliest pending peer time
    #[default]
    EventDriven,
    /// Never jump further than the next multiple of `step` minutes
    FixedIncrement { step: f64 },
}

/// Virtual clock of one simulation run
///
/// Not `Clone`: holding `&mut SimulationClock` is what makes a component
/// the writer. Readers get a [`ClockHandle`].
pub struct SimulationClock {
    /// Current time, published to every handle
    current: watch::Sender<SimTime>,
    /// Terminal time of the run
    horizon: SimTime,
    step_mode: StepMode,
}

impl SimulationClock {
    /// Create a clock starting at `start`
    ///
    /// # Arguments
    /// * `start` - Initial virtual time
    /// * `horizon` - Terminal time, must not precede `start`
    /// * `step_mode` - Event-driven or fixed-increment stepping
    pub fn new(start: SimTime, horizon: SimTime, step_mode: StepMode) -> Result<Self, ClockError> {
        if horizon < start {
            return Err(ClockError::InvalidHorizon { start, horizon });
        }
        if let StepMode::FixedIncrement { step } = step_mode {
            if !(step.is_finite() && step > 0.0) {
                return Err(ClockError::InvalidStep(step.to_string()));
            }
        }

        let (current, _) = watch::channel(start);
        Ok(Self {
            current,
            horizon,
            step_mode,
        })
    }

    /// Subscribe a read-only view of this clock
    pub fn subscribe(&self) -> ClockHandle {
        ClockHandle::new(self.current.subscribe(), self.horizon)
    }

    pub fn now(&self) -> SimTime {
        *self.current.borrow()
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    pub fn step_mode(&self) -> StepMode {
        self.step_mode
    }

    /// Whether the clock has reached the terminal time
    pub fn at_horizon(&self) -> bool {
        self.now() >= self.horizon
    }

    /// Move the clock to `to`
    ///
    /// Advancing to the current time is a no-op; moving backwards or past
    /// the horizon is rejected.
    pub fn advance(&mut self, to: SimTime) -> Result<(), ClockError> {
        let from = self.now();
        if to < from {
            return Err(ClockError::Rewind { from, to });
        }
        if to > self.horizon {
            return Err(ClockError::BeyondHorizon {
                to,
                horizon: self.horizon,
            });
        }
        if to != from {
            self.current.send_replace(to);
        }
        Ok(())
    }

    /// Compute the next round's global time from the earliest pending peer time
    ///
    /// Returns None when the run is complete: nothing is pending, or the
    /// earliest pending time lies beyond the horizon.
    pub fn next_target(&self, earliest: Option<SimTime>) -> Option<SimTime> {
        let earliest = earliest.filter(|t| *t <= self.horizon)?;
        let target = match self.step_mode {
            StepMode::EventDriven => earliest,
            StepMode::FixedIncrement { step } => earliest.min(self.next_grid_point(step)),
        };
        Some(target.max(self.now()).min(self.horizon))
    }

    fn next_grid_point(&self, step: f64) -> SimTime {
        let now = self.now().minutes();
        let next = ((now / step).floor() + 1.0) * step;
        SimTime::new(next).unwrap_or(self.horizon).min(self.horizon)
    }
}

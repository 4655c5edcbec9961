use junction_core::SimTime;
use junction_ports::Clock;
use tokio::sync::watch;

/// Read-only view of a [`SimulationClock`](crate::SimulationClock)
///
/// Cheap to clone; every clone sees the writer's latest value.
#[derive(Clone)]
pub struct ClockHandle {
    current: watch::Receiver<SimTime>,
    horizon: SimTime,
}

impl ClockHandle {
    pub(crate) fn new(current: watch::Receiver<SimTime>, horizon: SimTime) -> Self {
        Self { current, horizon }
    }

    /// Wait until the clock moves, returning the new time
    ///
    /// Returns None once the owning clock has been dropped.
    pub async fn changed(&mut self) -> Option<SimTime> {
        self.current.changed().await.ok()?;
        Some(*self.current.borrow_and_update())
    }
}

impl Clock for ClockHandle {
    fn now(&self) -> SimTime {
        *self.current.borrow()
    }

    fn horizon(&self) -> SimTime {
        self.horizon
    }

    fn name(&self) -> &str {
        "SimulationClock"
    }
}

use junction_core::SimTime;

/// Port for reading the shared virtual clock
///
/// Only the scheduler advances the clock; every other component reads it
/// through this trait.
pub trait Clock: Send + Sync {
    /// Current virtual time
    fn now(&self) -> SimTime;

    /// Terminal time of the run
    fn horizon(&self) -> SimTime;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}

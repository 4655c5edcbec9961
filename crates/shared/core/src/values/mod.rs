use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Rejected raw time value (NaN or infinite)
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Invalid simulation time: {0}")]
pub struct InvalidTime(pub f64);

/// Virtual scenario time, in minutes since the scenario epoch
///
/// Always finite, so it carries a total order and can be used as a sort key.
/// Negative zero is normalised to zero on construction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create a time value, returning None for NaN or infinite input
    pub fn new(minutes: f64) -> Option<Self> {
        if !minutes.is_finite() {
            return None;
        }
        // -0.0 and 0.0 must compare equal under total_cmp
        Some(Self(if minutes == 0.0 { 0.0 } else { minutes }))
    }

    pub fn minutes(self) -> f64 {
        self.0
    }

    /// Add a finite offset, saturating instead of producing infinities
    pub fn offset(self, minutes: f64) -> Self {
        Self::new(self.0 + minutes).unwrap_or(self)
    }
}

impl TryFrom<f64> for SimTime {
    type Error = InvalidTime;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidTime(value))
    }
}

impl From<SimTime> for f64 {
    fn from(time: SimTime) -> Self {
        time.0
    }
}

impl From<u32> for SimTime {
    fn from(minutes: u32) -> Self {
        Self(minutes as f64)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pickup/dropoff interval of a reservation
///
/// Treated as half-open `[pickup, dropoff)` when checking overlap, so
/// back-to-back bookings on the same resource do not conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub pickup: SimTime,
    pub dropoff: SimTime,
}

impl TimeWindow {
    /// Create a window; returns None if dropoff precedes pickup
    pub fn new(pickup: SimTime, dropoff: SimTime) -> Option<Self> {
        (pickup <= dropoff).then_some(Self { pickup, dropoff })
    }

    /// Zero-length window at a single instant
    pub fn instant(at: SimTime) -> Self {
        Self {
            pickup: at,
            dropoff: at,
        }
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        if self.pickup == self.dropoff || other.pickup == other.dropoff {
            // an instant overlaps anything that covers it
            let (instant, span) = if self.pickup == self.dropoff {
                (self, other)
            } else {
                (other, self)
            };
            if span.pickup == span.dropoff {
                return instant.pickup == span.pickup;
            }
            return span.pickup <= instant.pickup && instant.pickup < span.dropoff;
        }
        self.pickup < other.dropoff && other.pickup < self.dropoff
    }
}

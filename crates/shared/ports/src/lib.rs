//! Junction Ports
//!
//! Port definitions (traits) for the Junction simulation broker.
//! These define the boundaries between the synchronization core and the
//! transports used to reach peers.

mod clock;
mod error;
mod peer;

pub use clock::Clock;
pub use error::{PeerError, PeerResult};
pub use peer::{Delivery, PeerAdapter};

//! Wire message types for peer communication
//!
//! JSON bodies exchanged with peers. These stay separate from the domain
//! types so the wire format can be lenient (aliases, optional fields)
//! while the core stays strict.

pub mod booking;
pub mod sync;
pub mod writer;

pub use booking::{BookingRequest, ReservableResponse};
pub use sync::{AdvanceRequest, AdvanceResponse, PeekResponse, WireEvent};
pub use writer::LogRecord;

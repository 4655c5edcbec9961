//! Junction Event Merge
//!
//! Folds the events every peer emitted in one round into a single,
//! deterministically ordered stream, and keeps the run's merged timeline.
//!
//! Ordering key inside a round: `(time, peer priority rank, arrival sequence within peer)`.
//! The stream of a round is only released once every peer scheduled for
//! it has responded or been abandoned.

mod error;
mod queue;
mod timeline;

pub use error::{MergeError, MergeResult};
pub use queue::{ClosedRound, MergeKey, MergeQueue, PeerRank};
pub use timeline::{MergedEvent, Timeline};

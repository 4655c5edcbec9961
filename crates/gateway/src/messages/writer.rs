//! Result writer messages (`/result/events/`)

use junction_core::Event;
use serde::{Deserialize, Serialize};

/// One line of the uploaded event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Contiguous from 0 over the whole run
    pub seqno: u64,
    pub data: Event,
}

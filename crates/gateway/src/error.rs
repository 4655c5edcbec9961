//! Error types for the gateway crate

use junction_ports::PeerError;
use thiserror::Error;

/// Errors raised while talking to a peer over HTTP
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Peer answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Out-of-contract response: {0}")]
    Contract(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Decode(e.to_string())
    }
}

/// Classify transport failures into the broker's peer error taxonomy
///
/// Network failures and server-side errors are transient; anything the
/// peer answered that does not fit the protocol is a protocol error.
impl From<GatewayError> for PeerError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Http(e) if e.is_decode() => PeerError::Protocol(e.to_string()),
            GatewayError::Http(e) => PeerError::Transient(e.to_string()),
            GatewayError::Status { status, body } if status >= 500 => {
                PeerError::Transient(format!("HTTP {}: {}", status, body))
            }
            GatewayError::Status { status, body } => {
                PeerError::Protocol(format!("HTTP {}: {}", status, body))
            }
            GatewayError::Endpoint(e) => PeerError::Protocol(e.to_string()),
            GatewayError::Decode(msg) | GatewayError::Contract(msg) => PeerError::Protocol(msg),
        }
    }
}

use crate::dto::ErrorResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use junction_runner::{RegistryError, RunError};

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
    pub status: StatusCode,
}

impl ApiError {
    pub fn bad_request(code: i32, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn not_found(code: i32, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            status: StatusCode::NOT_FOUND,
        }
    }

    pub fn conflict(code: i32, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            status: StatusCode::CONFLICT,
        }
    }

    pub fn bad_gateway(code: i32, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            status: StatusCode::BAD_GATEWAY,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError {
            code: -1000,
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn no_run() -> Self {
        Self::not_found(-1001, "No run has been set up")
    }

    pub fn run_in_progress() -> Self {
        Self::conflict(-1003, "The run is already being driven")
    }

    pub fn missing_parameter(param: &str) -> Self {
        Self::bad_request(
            -1102,
            format!("Mandatory parameter '{}' was not sent", param),
        )
    }

    pub fn invalid_parameter(param: &str, reason: &str) -> Self {
        Self::bad_request(-1100, format!("Illegal parameter '{}': {}", param, reason))
    }
}

impl From<RunError> for ApiError {
    fn from(error: RunError) -> Self {
        let message = error.to_string();
        match error {
            RunError::Settings(_) => Self::bad_request(-1101, message),
            RunError::Registry(RegistryError::UnknownPeer(_)) => Self::not_found(-2001, message),
            RunError::Registry(_) => Self::conflict(-2000, message),
            RunError::MissingPeer(_) => Self::not_found(-2002, message),
            RunError::Peer(_) => Self::bad_gateway(-2003, message),
            RunError::InvalidPhase { .. } => Self::conflict(-1002, message),
            RunError::SetupProbeFailed(_)
            | RunError::MandatoryPeerOffline(_)
            | RunError::HorizonUnreachable
            | RunError::Aborted => Self::conflict(-1004, message),
            RunError::Clock(_) | RunError::Merge(_) | RunError::Gateway(_) => {
                Self::internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse::new(self.code, self.message));
        (self.status, body).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API Error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

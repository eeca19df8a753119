use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Coarse classification of a failed submission, shown alongside the message.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ServiceUnavailable,
    NotFound,
    Timeout,
    Unknown,
}

/// Errors raised by the speed-test backends and the submission boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Please enter a valid URL including http:// or https:// ({0})")]
    InvalidInput(String),

    #[error("Speed-test service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Test {0} not found. It might have expired.")]
    NotFound(String),

    #[error("Test did not finish after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("{0}")]
    Unknown(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Timeout { .. } => ErrorKind::Timeout,
            ServiceError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

/// Errors returned by the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum LabError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("No completed test to show trend data for")]
    NotComplete,

    #[error("A newer analysis replaced this one")]
    Superseded,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl IntoResponse for LabError {
    fn into_response(self) -> Response {
        let status = match &self {
            LabError::Service(e) => match e.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::ServiceUnavailable => StatusCode::BAD_GATEWAY,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            },
            LabError::NotComplete | LabError::Superseded => StatusCode::CONFLICT,
            LabError::Validation(_) => StatusCode::BAD_REQUEST,
            LabError::Settings(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

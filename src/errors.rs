use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::ProfileError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("call session not found: {0}")]
    SessionNotFound(String),

    #[error("call {call_id} is {state}, not listening")]
    InvalidState { call_id: String, state: String },

    #[error("call {0} ended while the utterance was being handled")]
    CallEnded(String),

    #[error("appointment scheduling is not enabled for business {0}")]
    SchedulingDisabled(String),

    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid business profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("calendar error: {0}")]
    Calendar(String),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("NLU error: {0}")]
    Nlu(String),

    #[error("speech error: {0}")]
    Speech(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState { .. } => StatusCode::CONFLICT,
            AppError::CallEnded(_) => StatusCode::GONE,
            AppError::SchedulingDisabled(_) => StatusCode::CONFLICT,
            AppError::SlotUnavailable(_) => StatusCode::CONFLICT,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Profile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Calendar(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Nlu(_) => StatusCode::BAD_GATEWAY,
            AppError::Speech(_) => StatusCode::BAD_GATEWAY,
            AppError::Notification(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

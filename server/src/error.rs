use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session mismatch: {0}")]
    SessionMismatch(String),

    #[error("Scheduler error: {0}")]
    Engine(#[from] highlight_core::EngineError),

    #[error("Alignment error: {0}")]
    AlignmentError(#[from] anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::SessionMismatch(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Engine(e) => {
                tracing::error!("Scheduler error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Scheduler error: {}", e))
            }
            ApiError::AlignmentError(e) => {
                tracing::error!("Alignment error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Alignment error: {}", e))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message.clone(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

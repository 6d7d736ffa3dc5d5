//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a
//! `{"success": false, "error": "..."}` body with a matching status code.
//!
//! Database and internal errors are logged with full detail; the caller only
//! sees a generic message.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::gemini::ModelError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Missing credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials present but not acceptable.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The model provider failed; the message is passed through to the caller.
    #[error("{0}")]
    Upstream(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ServerError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ServerError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m),
            ServerError::Upstream(m) => {
                warn!(message = %m, "model provider error");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
            ServerError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "The AI service did not respond in time.".to_owned(),
            ),
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_owned())
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_owned())
            }
        };
        (status, Json(json!({ "success": false, "error": client_message }))).into_response()
    }
}

impl From<ModelError> for ServerError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Timeout => ServerError::UpstreamTimeout,
            ModelError::MissingKey => ServerError::Internal(e.to_string()),
            other => ServerError::Upstream(other.to_string()),
        }
    }
}

impl From<MultipartError> for ServerError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge("Uploaded file is too large.".to_owned())
        } else {
            ServerError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

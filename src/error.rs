use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefineryError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Extraction error: {0}")]
    Extract(String),

    #[error("Archive safety violation: {0}")]
    ArchiveSafety(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RefineryError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RefineryError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            RefineryError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RefineryError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            RefineryError::Llm(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            RefineryError::LlmUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            RefineryError::Extract(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            RefineryError::ArchiveSafety(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            RefineryError::Parse(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            RefineryError::Database(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            RefineryError::Http(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            RefineryError::Json(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            RefineryError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            RefineryError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RefineryError>;

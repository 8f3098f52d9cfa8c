//! API request handlers

pub mod campaigns;
pub mod health;
pub mod warmup;
pub mod webhooks;

pub use health::*;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub(crate) fn error_response(
    status: StatusCode,
    error: &str,
    message: impl ToString,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}

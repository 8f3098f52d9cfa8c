//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Basic health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Detailed health response with component checks
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub database: ComponentHealth,
}

/// Individual component health status
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// GET /health/detailed
pub async fn health_detailed(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    match state.db_pool.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(DetailedHealthResponse {
                status: "healthy".to_string(),
                database: ComponentHealth {
                    status: "healthy".to_string(),
                    error: None,
                },
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(DetailedHealthResponse {
                status: "unhealthy".to_string(),
                database: ComponentHealth {
                    status: "unhealthy".to_string(),
                    error: Some(e.to_string()),
                },
            }),
        ),
    }
}

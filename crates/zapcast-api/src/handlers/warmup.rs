//! Warmup control handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use zapcast_core::{WarmupError, WarmupSettings};
use zapcast_storage::models::WarmupStats;

use super::{error_response, ErrorResponse};
use crate::state::AppState;

fn map_warmup_error(e: WarmupError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        WarmupError::UserNotFound | WarmupError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
        WarmupError::InstanceNotConnected(_) => StatusCode::CONFLICT,
        WarmupError::NoUsableContent => StatusCode::UNPROCESSABLE_ENTITY,
        WarmupError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Warmup error: {}", e);
    }
    error_response(status, "warmup_error", e)
}

/// Request body for starting warmup
#[derive(Debug, Deserialize)]
pub struct StartWarmupRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub settings: WarmupSettings,
}

/// Response listing affected instances
#[derive(Debug, Serialize)]
pub struct WarmupInstancesResponse {
    pub instances: Vec<String>,
}

/// POST /api/v1/warmup/start
pub async fn start_warmup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartWarmupRequest>,
) -> Result<Json<WarmupInstancesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let instances = state
        .warmup
        .start(request.user_id, request.settings)
        .await
        .map_err(map_warmup_error)?;

    info!("Warmup started for {} instances", instances.len());
    Ok(Json(WarmupInstancesResponse { instances }))
}

/// POST /api/v1/warmup/:instance_name/stop
pub async fn stop_warmup(
    State(state): State<Arc<AppState>>,
    Path(instance_name): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let stopped = state
        .warmup
        .stop(&instance_name)
        .await
        .map_err(map_warmup_error)?;

    if stopped {
        info!("Warmup stopped for instance {}", instance_name);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(
            StatusCode::NOT_FOUND,
            "warmup_error",
            format!("No active warmup for instance {}", instance_name),
        ))
    }
}

/// POST /api/v1/users/:user_id/warmup/stop-all
pub async fn stop_all_warmups(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<WarmupInstancesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let instances = state
        .warmup
        .stop_all(user_id)
        .await
        .map_err(map_warmup_error)?;

    Ok(Json(WarmupInstancesResponse { instances }))
}

/// GET /api/v1/warmup/:instance_name/stats
pub async fn warmup_stats(
    State(state): State<Arc<AppState>>,
    Path(instance_name): Path<String>,
) -> Result<Json<WarmupStats>, (StatusCode, Json<ErrorResponse>)> {
    let stats = state
        .warmup
        .stats(&instance_name)
        .await
        .map_err(map_warmup_error)?
        .ok_or_else(|| {
            error_response(
                StatusCode::NOT_FOUND,
                "warmup_error",
                format!("No warmup record for instance {}", instance_name),
            )
        })?;

    Ok(Json(stats))
}

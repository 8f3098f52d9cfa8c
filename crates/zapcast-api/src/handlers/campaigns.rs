//! Campaign lifecycle handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use zapcast_core::{DispatchError, DispatchSummary};

use super::{error_response, ErrorResponse};
use crate::state::AppState;

fn map_dispatch_error(e: DispatchError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        DispatchError::NotFound => StatusCode::NOT_FOUND,
        DispatchError::AlreadyRunning
        | DispatchError::NotPaused
        | DispatchError::NotRunning => StatusCode::CONFLICT,
        DispatchError::NoContent
        | DispatchError::UnsupportedMediaType(_)
        | DispatchError::NoLeads
        | DispatchError::NoConnectedInstances => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Campaign dispatch error: {}", e);
    }
    error_response(status, "dispatch_error", e)
}

/// POST /api/v1/campaigns/:campaign_id/start
pub async fn start_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<DispatchSummary>, (StatusCode, Json<ErrorResponse>)> {
    let summary = state
        .dispatcher
        .start(campaign_id)
        .await
        .map_err(map_dispatch_error)?;

    info!("Started campaign {}", campaign_id);
    Ok(Json(summary))
}

/// POST /api/v1/campaigns/:campaign_id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<DispatchSummary>, (StatusCode, Json<ErrorResponse>)> {
    let summary = state
        .dispatcher
        .pause(campaign_id)
        .await
        .map_err(map_dispatch_error)?;

    info!("Paused campaign {}", campaign_id);
    Ok(Json(summary))
}

/// POST /api/v1/campaigns/:campaign_id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<DispatchSummary>, (StatusCode, Json<ErrorResponse>)> {
    let summary = state
        .dispatcher
        .resume(campaign_id)
        .await
        .map_err(map_dispatch_error)?;

    info!("Resumed campaign {}", campaign_id);
    Ok(Json(summary))
}

/// GET /api/v1/campaigns/:campaign_id/stats
pub async fn campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<DispatchSummary>, (StatusCode, Json<ErrorResponse>)> {
    let summary = state
        .dispatcher
        .stats(campaign_id)
        .await
        .map_err(map_dispatch_error)?;

    Ok(Json(summary))
}

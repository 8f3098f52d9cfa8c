//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, warmup, webhooks};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/detailed", get(health::health_detailed));

    let campaign_routes = Router::new()
        .route("/:campaign_id/start", post(campaigns::start_campaign))
        .route("/:campaign_id/pause", post(campaigns::pause_campaign))
        .route("/:campaign_id/resume", post(campaigns::resume_campaign))
        .route("/:campaign_id/stats", get(campaigns::campaign_stats));

    let warmup_routes = Router::new()
        .route("/start", post(warmup::start_warmup))
        .route("/:instance_name/stop", post(warmup::stop_warmup))
        .route("/:instance_name/stats", get(warmup::warmup_stats));

    let user_routes = Router::new().route(
        "/:user_id/warmup/stop-all",
        post(warmup::stop_all_warmups),
    );

    let webhook_routes = Router::new().route("/gateway", post(webhooks::gateway_webhook));

    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .nest("/warmup", warmup_routes)
        .nest("/users", user_routes)
        .nest("/webhooks", webhook_routes);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

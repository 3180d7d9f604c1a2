use axum::extract::State;
use domainscout_domain::HealthView;
use domainscout_dispatcher::QueueStats;
use serde::Serialize;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> ApiResponse<HealthView> {
    ApiResponse::success(state.dispatcher.health().await)
}

/// GET /api/worker_stats
pub async fn worker_stats(State(state): State<AppState>) -> ApiResult<ApiResponse<QueueStats>> {
    let stats = state.dispatcher.worker_stats().await?;
    Ok(ApiResponse::success(stats))
}

#[derive(Debug, Serialize)]
pub struct ReprobeResult {
    pub parallel_available: bool,
}

/// POST /api/mode/reprobe
pub async fn reprobe(State(state): State<AppState>) -> ApiResponse<ReprobeResult> {
    let parallel_available = state.dispatcher.reprobe().await;
    ApiResponse::success(ReprobeResult { parallel_available })
}

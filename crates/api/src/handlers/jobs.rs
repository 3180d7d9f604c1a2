use axum::extract::{Path, State};
use axum::Json;
use domainscout_domain::{JobView, ProcessingMode, Submission};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Raw domain entries; each may hold several comma- or
    /// whitespace-separated tokens.
    pub domains: Vec<String>,
    /// Optional mode hint. Omitted means "whatever is available".
    #[serde(default)]
    pub mode: Option<ProcessingMode>,
}

/// POST /api/process
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<ApiResponse<Submission>> {
    let submission = state
        .dispatcher
        .submit(&request.domains, request.mode)
        .await?;
    info!(
        "accepted job {} ({} domains, {} mode)",
        submission.job_id, submission.count, submission.mode
    );
    Ok(ApiResponse::success_with_message(
        submission,
        "job accepted".to_string(),
    ))
}

/// GET /api/status/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<ApiResponse<JobView>> {
    let view = state.dispatcher.status(&job_id).await?;
    Ok(ApiResponse::success(view))
}

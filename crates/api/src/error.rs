use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domainscout_domain::ScoutError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Scout(#[from] ScoutError),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::Scout(ScoutError::UnknownJob { id }) => (
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
                format!("job {id} does not exist or has expired"),
            ),
            ApiError::Scout(ScoutError::InvalidSubmission(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_SUBMISSION", msg.clone())
            }
            ApiError::Scout(ScoutError::BackendUnavailable(msg)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "BACKEND_UNAVAILABLE",
                msg.clone(),
            ),
            ApiError::Scout(other) => {
                error!("request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    other.to_string(),
                )
            }
            ApiError::Internal(msg) => {
                error!("request failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    msg.clone(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "type": error_type,
                "message": message,
            },
            "timestamp": chrono::Utc::now(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

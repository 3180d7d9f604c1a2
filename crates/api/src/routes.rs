use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use domainscout_dispatcher::JobDispatcher;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    health::{health, reprobe, worker_stats},
    jobs::{job_status, submit_job},
};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<JobDispatcher>,
}

pub fn create_app(dispatcher: Arc<JobDispatcher>) -> Router {
    Router::new()
        .route("/api/process", post(submit_job))
        .route("/api/status/{job_id}", get(job_status))
        .route("/api/health", get(health))
        .route("/api/worker_stats", get(worker_stats))
        .route("/api/mode/reprobe", post(reprobe))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { dispatcher })
}

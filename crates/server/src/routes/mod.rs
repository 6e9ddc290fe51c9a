// crates/server/src/routes/mod.rs
//! API route handlers for the docflow server.

pub mod health;
pub mod jobs;
pub mod metrics;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router: API routes under `/api` plus `/metrics`.
///
/// Routes:
/// - GET  /api/health - Liveness check
/// - POST /api/jobs - Upload a document and start a conversion job
/// - GET  /api/jobs/{id} - Job snapshot
/// - GET  /api/jobs/{id}/events - SSE stream of job events
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.uploads.max_upload_bytes;
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router(max_upload_bytes))
        .merge(metrics::router())
        .with_state(state)
}

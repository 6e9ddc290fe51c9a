// crates/server/src/routes/metrics.rs
//! Prometheus scrape endpoint at `GET /metrics` (outside the `/api` prefix).

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::metrics::render_metrics;
use crate::state::AppState;

/// GET /metrics - Prometheus text format, or 503 before the recorder is installed.
pub async fn metrics_handler() -> Response {
    match render_metrics() {
        Some(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response(),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_endpoint_renders_text() {
        crate::metrics::init_metrics();
        // Another test may have won the init race; wait for its handle.
        for _ in 0..100 {
            if render_metrics().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let response = metrics_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_metrics_route_is_not_under_api() {
        let state = crate::state::AppState::new(
            Arc::new(docflow_jobs::JobRegistry::default()),
            crate::state::UploadSettings::in_dir(std::env::temp_dir()),
        );
        let app = router().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/api/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

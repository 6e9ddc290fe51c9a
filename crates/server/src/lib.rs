// crates/server/src/lib.rs
//! docflow server library.
//!
//! Axum HTTP layer over `docflow-jobs`: document upload, per-job SSE event
//! streams, converted file downloads and Prometheus metrics.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::*;
pub use routes::api_routes;
pub use state::{AppState, UploadSettings};

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes and `/metrics`
/// - `/downloads/*` serving the outputs directory
/// - an optional frontend build (`static_dir`) for every other path
/// - CORS for development (allows any origin) and request tracing
pub fn create_app(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let downloads = ServeDir::new(&state.uploads.outputs_dir);
    let app = api_routes(state).nest_service(config::DOWNLOADS_PREFIX, downloads);

    let app = match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => app,
    };

    app.layer(cors).layer(TraceLayer::new_for_http())
}

// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use docflow_jobs::JobRegistry;

/// Where uploads go and what the upload route accepts.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub uploads_dir: PathBuf,
    pub outputs_dir: PathBuf,
    /// Extension (no dot) given to the worker's output file.
    pub output_extension: String,
    /// Lowercase extensions (no dot) accepted by `POST /api/jobs`.
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
}

impl UploadSettings {
    /// Settings rooted in `dir`, using `uploads/` and `outputs/` below it.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            uploads_dir: dir.join("uploads"),
            outputs_dir: dir.join("outputs"),
            output_extension: "md".to_string(),
            allowed_extensions: vec!["pdf".to_string()],
            max_upload_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn accepts(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|ext| *ext == extension)
    }
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Every job this process has accepted.
    pub registry: Arc<JobRegistry>,
    pub uploads: UploadSettings,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(registry: Arc<JobRegistry>, uploads: UploadSettings) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            registry,
            uploads,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

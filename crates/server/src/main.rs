// crates/server/src/main.rs
//! docflow server binary.
//!
//! Reads configuration from flags and `DOCFLOW_*` environment variables,
//! prepares the upload and output directories, then serves until killed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use docflow_jobs::JobRegistry;
use docflow_observability::init_tracing;
use docflow_server::{create_app, metrics::init_metrics, AppState, Config};

/// Upper bound on how often the retention sweep runs.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    let _tracing = init_tracing(&config.log_config())?;

    let startup_start = Instant::now();
    init_metrics();

    let uploads = config.upload_settings();
    for dir in [&uploads.uploads_dir, &uploads.outputs_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let registry = Arc::new(
        JobRegistry::new(config.supervisor()).with_heartbeat_interval(config.heartbeat_interval()),
    );
    if let Some(ttl) = config.job_ttl() {
        let every = (ttl / 2).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
        registry.spawn_retention_sweep(ttl, every);
        tracing::info!(ttl_secs = ttl.as_secs(), "finished-job retention enabled");
    }

    tracing::info!(
        program = %config.worker_program.display(),
        args = ?config.worker_args,
        uploads = %uploads.uploads_dir.display(),
        outputs = %uploads.outputs_dir.display(),
        "worker configured"
    );

    let state = AppState::new(registry, uploads);
    let app = create_app(state, config.static_dir.clone());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(
        %addr,
        startup_ms = startup_start.elapsed().as_millis() as u64,
        "docflow v{} listening",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("\n  docflow v{} ready at http://{addr}\n", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, app).await?;

    Ok(())
}

// crates/server/src/config.rs
//! Command-line and environment configuration for the `docflow` binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use docflow_jobs::{ArtifactLocator, Supervisor, WorkerCommand};
use docflow_observability::{LogConfig, LogFormat};

use crate::state::UploadSettings;

pub const DEFAULT_PORT: u16 = 47900;

/// URL prefix the outputs directory is served under.
pub const DOWNLOADS_PREFIX: &str = "/downloads";

/// 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "docflow", version, about = "Document conversion job server")]
pub struct Config {
    /// Listen port. Falls back to `PORT`, then 47900.
    #[arg(short, long, env = "DOCFLOW_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "DOCFLOW_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Where accepted uploads are stored until their worker exits.
    #[arg(long, env = "DOCFLOW_UPLOADS_DIR", default_value = "uploads")]
    pub uploads_dir: PathBuf,

    /// Where workers write their output; served under `/downloads`.
    #[arg(long, env = "DOCFLOW_OUTPUTS_DIR", default_value = "outputs")]
    pub outputs_dir: PathBuf,

    #[arg(long, env = "DOCFLOW_WORKER_PROGRAM", default_value = "python3")]
    pub worker_program: PathBuf,

    /// Worker arguments. `{input}` and `{output}` are replaced per job.
    #[arg(
        long,
        env = "DOCFLOW_WORKER_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true,
        default_values = ["convert.py", "{input}", "{output}"]
    )]
    pub worker_args: Vec<String>,

    /// Extension of the primary output file.
    #[arg(long, env = "DOCFLOW_OUTPUT_EXT", default_value = "md")]
    pub output_ext: String,

    /// Extension of the optional sibling artifact written next to the output.
    #[arg(long, env = "DOCFLOW_SIBLING_EXT", default_value = "json")]
    pub sibling_ext: String,

    /// Comma-separated upload extensions that are accepted.
    #[arg(long, env = "DOCFLOW_ALLOWED_EXTS", value_delimiter = ',', default_value = "pdf")]
    pub allowed_exts: Vec<String>,

    #[arg(long, env = "DOCFLOW_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Keep-alive interval for event streams, in milliseconds.
    #[arg(long, env = "DOCFLOW_HEARTBEAT_MS", default_value_t = 2000)]
    pub heartbeat_ms: u64,

    /// Evict finished jobs older than this many seconds. Unset keeps them forever.
    #[arg(long, env = "DOCFLOW_JOB_TTL_SECS")]
    pub job_ttl_secs: Option<u64>,

    /// Frontend build to serve for non-API paths.
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    #[arg(long, env = "DOCFLOW_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Directory for daily-rolling JSON log files.
    #[arg(long, env = "DOCFLOW_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// `--port`/`DOCFLOW_PORT`, then `PORT`, then the default.
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port())
    }

    pub fn worker_command(&self) -> WorkerCommand {
        WorkerCommand::new(&self.worker_program, &self.worker_args)
    }

    pub fn artifact_locator(&self) -> ArtifactLocator {
        ArtifactLocator::new(DOWNLOADS_PREFIX, &self.sibling_ext)
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.worker_command(), self.artifact_locator())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }

    pub fn job_ttl(&self) -> Option<Duration> {
        self.job_ttl_secs.map(Duration::from_secs)
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            uploads_dir: self.uploads_dir.clone(),
            outputs_dir: self.outputs_dir.clone(),
            output_extension: normalize_ext(&self.output_ext),
            allowed_extensions: self
                .allowed_exts
                .iter()
                .map(|ext| normalize_ext(ext))
                .filter(|ext| !ext.is_empty())
                .collect(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format,
            directory: self.log_dir.clone(),
            ..LogConfig::default()
        }
    }
}

/// Lowercase and strip a leading dot: `.PDF` -> `pdf`.
fn normalize_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

// crates/jobs/src/lib.rs
//! Job orchestration engine for external conversion workers.
//!
//! Provides:
//! - `JobRegistry` - owns every job; entry point for starting and subscribing
//! - `Supervisor` - spawns the worker and drives the job to a terminal state
//! - `Broadcaster` - best-effort fan-out of job events to subscribers
//! - `Subscription` - one subscriber's event stream plus its heartbeat

pub mod broadcast;
mod decode;
pub mod error;
pub mod job;
pub mod registry;
pub mod supervisor;
pub mod types;
pub mod worker;

pub use broadcast::{Broadcaster, SubscriberId, DEFAULT_HEARTBEAT_INTERVAL};
pub use error::JobError;
pub use job::{Job, Subscription};
pub use registry::JobRegistry;
pub use supervisor::{Supervisor, DEFAULT_PIPE_DRAIN_TIMEOUT};
pub use types::{DownloadUrls, JobEvent, JobId, JobSnapshot, JobStatus, LogStream, SinkMessage};
pub use worker::{ArtifactLocator, WorkerCommand};

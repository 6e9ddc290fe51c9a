// crates/jobs/src/types.rs
//! Types for the job orchestration engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Unique identifier for a conversion job.
///
/// Always a random (v4) UUID, never a counter, so ids cannot be guessed.
pub type JobId = Uuid;

/// Retrieval locators for produced artifacts, keyed by file suffix.
pub type DownloadUrls = BTreeMap<String, String>;

/// Lifecycle status of a job.
///
/// `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
    Failed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which worker pipe a log chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// An event delivered to job subscribers.
///
/// Serializes to the event payload only; the event name comes from
/// [`JobEvent::name`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobEvent {
    Status {
        status: JobStatus,
    },
    Log {
        #[serde(rename = "type")]
        stream: LogStream,
        message: String,
    },
    Error {
        message: String,
    },
    Done {
        ok: bool,
        code: Option<i32>,
        #[serde(rename = "downloadUrls")]
        download_urls: Option<DownloadUrls>,
    },
}

impl JobEvent {
    /// Wire name of the event (`status`, `log`, `error`, `done`).
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Status { .. } => "status",
            JobEvent::Log { .. } => "log",
            JobEvent::Error { .. } => "error",
            JobEvent::Done { .. } => "done",
        }
    }

    /// `done` is the last event a job ever emits.
    pub fn is_done(&self) -> bool {
        matches!(self, JobEvent::Done { .. })
    }

    /// Nothing follows this event on a subscription: either `done`, or the
    /// terminal `status` greeting of a subscriber that attached too late.
    pub fn is_final(&self) -> bool {
        match self {
            JobEvent::Status { status } => status.is_terminal(),
            other => other.is_done(),
        }
    }
}

/// What a subscriber sink receives: a job event or a keep-alive tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    Event(JobEvent),
    Heartbeat,
}

/// Point-in-time view of a job, for the REST snapshot route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub subscribers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }

    #[test]
    fn test_is_final() {
        let running = JobEvent::Status {
            status: JobStatus::Running,
        };
        let failed = JobEvent::Status {
            status: JobStatus::Failed,
        };
        let error = JobEvent::Error {
            message: "boom".into(),
        };
        assert!(!running.is_final());
        assert!(failed.is_final());
        assert!(!error.is_final());
    }

    #[test]
    fn test_status_event_serialize() {
        let event = JobEvent::Status {
            status: JobStatus::Running,
        };
        assert_eq!(event.name(), "status");
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"status":"running"}"#
        );
    }

    #[test]
    fn test_log_event_serialize() {
        let event = JobEvent::Log {
            stream: LogStream::Stderr,
            message: "warning: font missing\n".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stderr");
        assert_eq!(json["message"], "warning: font missing\n");
    }

    #[test]
    fn test_failed_done_serializes_null_urls() {
        let event = JobEvent::Done {
            ok: false,
            code: Some(2),
            download_urls: None,
        };
        assert!(event.is_done());
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"ok":false,"code":2,"downloadUrls":null}"#
        );
    }

    #[test]
    fn test_successful_done_serializes_urls() {
        let mut urls = DownloadUrls::new();
        urls.insert("md".into(), "/downloads/a.md".into());
        let event = JobEvent::Done {
            ok: true,
            code: Some(0),
            download_urls: Some(urls),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["code"], 0);
        assert_eq!(json["downloadUrls"]["md"], "/downloads/a.md");
    }
}

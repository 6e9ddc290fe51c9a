// crates/jobs/src/job.rs
//! State for a single conversion job.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::{spawn_heartbeat, Broadcaster, SubscriberId};
use crate::types::{DownloadUrls, JobEvent, JobId, JobSnapshot, JobStatus, LogStream, SinkMessage};

/// How a job's worker ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Termination {
    /// The worker process could not be spawned.
    LaunchFailed { message: String },
    /// The worker ran and exited. `artifacts` is `Some` only when the exit
    /// code was zero and the output file exists.
    Exited {
        code: Option<i32>,
        artifacts: Option<DownloadUrls>,
    },
}

/// One tracked conversion job.
///
/// Status, worker pid and the subscriber set sit behind a single mutex so a
/// subscriber's status snapshot, log broadcasts and the terminal transition
/// are totally ordered. The lock is never held across an `.await`.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    output_path: PathBuf,
    created_at: DateTime<Utc>,
    inner: Mutex<JobInner>,
}

#[derive(Debug)]
struct JobInner {
    status: JobStatus,
    worker_pid: Option<u32>,
    finished_at: Option<DateTime<Utc>>,
    broadcaster: Broadcaster,
}

impl Job {
    /// Create a job in `running` state with a fresh random id.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            output_path: output_path.into(),
            created_at: Utc::now(),
            inner: Mutex::new(JobInner {
                status: JobStatus::Running,
                worker_pid: None,
                finished_at: None,
                broadcaster: Broadcaster::new(),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    /// Pid of the running worker, if one has been spawned and not yet exited.
    pub fn worker_pid(&self) -> Option<u32> {
        self.lock().worker_pid
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lock().finished_at
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().broadcaster.len()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.lock();
        JobSnapshot {
            id: self.id,
            status: inner.status,
            created_at: self.created_at,
            finished_at: inner.finished_at,
            subscribers: inner.broadcaster.len(),
        }
    }

    /// Attach a new subscriber.
    ///
    /// The subscriber's first message is always a `status` event with the
    /// job's status at attach time, terminal states included. A keep-alive
    /// is sent every `heartbeat` until the subscription is detached.
    pub fn subscribe(self: &Arc<Self>, heartbeat: Duration) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let greeting = JobEvent::Status {
                status: inner.status,
            };
            inner.broadcaster.attach(tx.clone(), greeting)
        };
        tracing::debug!(job_id = %self.id, subscriber = id, "subscriber attached");

        Subscription {
            job: Arc::clone(self),
            id,
            rx,
            heartbeat: Some(spawn_heartbeat(tx, heartbeat)),
            attached: true,
        }
    }

    /// Remove a subscriber. Safe to call repeatedly and after termination.
    pub fn detach(&self, id: SubscriberId) -> bool {
        let removed = self.lock().broadcaster.detach(id);
        if removed {
            tracing::debug!(job_id = %self.id, subscriber = id, "subscriber detached");
        }
        removed
    }

    pub(crate) fn attach_worker(&self, pid: Option<u32>) {
        let mut inner = self.lock();
        if !inner.status.is_terminal() {
            inner.worker_pid = pid;
        }
    }

    /// Broadcast a chunk of worker output. Dropped once the job is terminal.
    pub(crate) fn log(&self, stream: LogStream, message: String) -> bool {
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return false;
        }
        inner.broadcaster.publish(&JobEvent::Log { stream, message });
        true
    }

    /// Move to a terminal state and emit the closing events.
    ///
    /// Only the first call has any effect; later calls return `false` and
    /// emit nothing, so a job produces exactly one `done`.
    pub(crate) fn finish(&self, termination: Termination) -> bool {
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            tracing::warn!(job_id = %self.id, status = %inner.status, "ignoring second termination");
            return false;
        }

        let (status, events) = match termination {
            Termination::LaunchFailed { message } => (
                JobStatus::Error,
                vec![
                    JobEvent::Error { message },
                    JobEvent::Done {
                        ok: false,
                        code: None,
                        download_urls: None,
                    },
                ],
            ),
            Termination::Exited { code, artifacts } => {
                let ok = artifacts.is_some();
                let status = if ok {
                    JobStatus::Finished
                } else {
                    JobStatus::Failed
                };
                (
                    status,
                    vec![JobEvent::Done {
                        ok,
                        code,
                        download_urls: artifacts,
                    }],
                )
            }
        };

        let now = Utc::now();
        inner.status = status;
        inner.worker_pid = None;
        inner.finished_at = Some(now);
        for event in &events {
            inner.broadcaster.publish(event);
        }
        drop(inner);

        let elapsed = (now - self.created_at).to_std().unwrap_or_default();
        metrics::counter!("docflow_jobs_completed_total", "status" => status.as_str()).increment(1);
        metrics::histogram!("docflow_job_duration_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            job_id = %self.id,
            status = %status,
            duration_secs = elapsed.as_secs_f64(),
            "job reached terminal state"
        );
        true
    }

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(job_id = %self.id, "job mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// A live attachment to one job's event stream.
///
/// Owns the subscriber's receiving channel and its heartbeat task. Dropping
/// the subscription detaches it and cancels the heartbeat.
#[derive(Debug)]
pub struct Subscription {
    job: Arc<Job>,
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<SinkMessage>,
    heartbeat: Option<JoinHandle<()>>,
    attached: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    /// Next message for this subscriber.
    ///
    /// Returns `None` once detached and drained.
    pub async fn recv(&mut self) -> Option<SinkMessage> {
        self.rx.recv().await
    }

    /// Stop receiving events and cancel the heartbeat. Idempotent.
    pub fn detach(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if self.attached {
            self.job.detach(self.id);
            self.attached = false;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

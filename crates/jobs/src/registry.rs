// crates/jobs/src/registry.rs
//! Registry of all conversion jobs known to this process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::broadcast::DEFAULT_HEARTBEAT_INTERVAL;
use crate::error::JobError;
use crate::job::{Job, Subscription};
use crate::supervisor::Supervisor;
use crate::types::JobId;

/// In-memory job registry and the single entry point for the HTTP layer.
///
/// Jobs are never removed unless a retention sweep is started with
/// [`JobRegistry::spawn_retention_sweep`], so by default the map grows for
/// the life of the process.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
    supervisor: Supervisor,
    heartbeat_interval: Duration,
}

impl JobRegistry {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            supervisor,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Set the keep-alive interval for new subscriptions.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Register a new job in `running` state. No worker is started.
    pub fn create_job(&self, output_path: impl Into<PathBuf>) -> Arc<Job> {
        let job = Arc::new(Job::new(output_path));
        self.write().insert(job.id(), Arc::clone(&job));
        tracing::debug!(job_id = %job.id(), "job registered");
        job
    }

    pub fn get_job(&self, id: &JobId) -> Option<Arc<Job>> {
        self.read().get(id).cloned()
    }

    /// Create a job and launch its worker.
    ///
    /// Returns as soon as the job is registered; the worker runs in the
    /// background. Must be called from within a Tokio runtime.
    pub fn start_job(&self, input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> JobId {
        let input_path = input_path.into();
        let job = self.create_job(output_path);
        let id = job.id();
        metrics::counter!("docflow_jobs_started_total").increment(1);
        tracing::info!(job_id = %id, input = %input_path.display(), "starting job");
        self.supervisor.start(job, input_path);
        id
    }

    /// Attach a subscriber to a job's event stream.
    pub fn subscribe(&self, id: &JobId) -> Result<Subscription, JobError> {
        let job = self
            .get_job(id)
            .ok_or_else(|| JobError::unknown_job(id.to_string()))?;
        Ok(job.subscribe(self.heartbeat_interval))
    }

    /// Same as [`subscribe`](Self::subscribe) for an id that has not been
    /// parsed yet. Malformed ids are unknown ids.
    pub fn subscribe_raw(&self, raw_id: &str) -> Result<Subscription, JobError> {
        let id: JobId = raw_id
            .parse()
            .map_err(|_| JobError::unknown_job(raw_id))?;
        self.subscribe(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop terminal jobs that finished more than `ttl` ago.
    ///
    /// Running jobs are never evicted. Returns how many jobs were removed.
    pub fn evict_finished(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at() {
            Some(finished) => now - finished < ttl,
            None => true,
        });
        before - jobs.len()
    }

    /// Periodically evict terminal jobs older than `ttl`.
    ///
    /// Opt-in: without this the registry keeps every job.
    pub fn spawn_retention_sweep(self: &Arc<Self>, ttl: Duration, every: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let evicted = registry.evict_finished(ttl);
                if evicted > 0 {
                    tracing::info!(evicted, remaining = registry.len(), "evicted finished jobs");
                }
            }
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Arc<Job>>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            tracing::error!("RwLock poisoned reading jobs map, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Arc<Job>>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            tracing::error!("RwLock poisoned writing jobs map, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(Supervisor::default())
    }
}

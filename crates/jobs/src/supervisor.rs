// crates/jobs/src/supervisor.rs
//! Runs the external worker for a job and drives the job to a terminal state.
//!
//! Per job: one task waits on the process, and one reader task per output
//! pipe forwards chunks as `log` events. Chunks from a single pipe keep
//! their order; stdout and stderr are independent and may interleave.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::decode::Utf8ChunkDecoder;
use crate::error::JobError;
use crate::job::{Job, Termination};
use crate::types::LogStream;
use crate::worker::{ArtifactLocator, WorkerCommand};

/// Read buffer size for worker pipes.
const READ_CHUNK: usize = 8 * 1024;

/// How long output readers may keep draining after the worker has exited.
pub const DEFAULT_PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Launches and watches worker processes.
#[derive(Debug, Clone)]
pub struct Supervisor {
    command: WorkerCommand,
    locator: ArtifactLocator,
    pipe_drain_timeout: Duration,
}

impl Supervisor {
    pub fn new(command: WorkerCommand, locator: ArtifactLocator) -> Self {
        Self {
            command,
            locator,
            pipe_drain_timeout: DEFAULT_PIPE_DRAIN_TIMEOUT,
        }
    }

    /// Bound the wait for buffered output once the worker has exited.
    ///
    /// A worker may leave a background process holding its stdout/stderr
    /// open; readers still running after this long are aborted and the job
    /// is terminated from the exit status alone.
    pub fn with_pipe_drain_timeout(mut self, timeout: Duration) -> Self {
        self.pipe_drain_timeout = timeout;
        self
    }

    /// Start the worker for `job`, reading `input` and writing the job's
    /// output path.
    ///
    /// Returns immediately; the returned handle resolves after the job is
    /// terminal and the input file has been removed.
    pub fn start(&self, job: Arc<Job>, input: PathBuf) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.supervise(job, input).await })
    }

    async fn supervise(&self, job: Arc<Job>, input: PathBuf) {
        let job_id = job.id();
        let started = Instant::now();
        let mut cmd = self.command.build(&input, job.output_path());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = JobError::Spawn {
                    program: self.command.program().to_path_buf(),
                    source,
                };
                tracing::error!(job_id = %job_id, error = %err, "worker failed to launch");
                job.finish(Termination::LaunchFailed {
                    message: err.to_string(),
                });
                remove_input(&input).await;
                return;
            }
        };

        job.attach_worker(child.id());
        tracing::info!(
            job_id = %job_id,
            pid = ?child.id(),
            input = %input.display(),
            output = %job.output_path().display(),
            "worker started"
        );

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(Arc::clone(&job), LogStream::Stdout, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(Arc::clone(&job), LogStream::Stderr, stderr));
        }

        let exit = child.wait().await;

        // Forward buffered chunks before the terminal event, but never wait
        // on pipes inherited by processes that outlive the worker.
        drain_readers(&job, readers, self.pipe_drain_timeout).await;

        let termination = match exit {
            Ok(status) => {
                let code = status.code();
                let produced = tokio::fs::try_exists(job.output_path())
                    .await
                    .unwrap_or(false);
                let artifacts = if code == Some(0) && produced {
                    Some(self.locator.collect(job.output_path()).await)
                } else {
                    if code == Some(0) {
                        tracing::warn!(
                            job_id = %job_id,
                            output = %job.output_path().display(),
                            "worker exited cleanly but produced no output"
                        );
                    }
                    None
                };
                tracing::info!(
                    job_id = %job_id,
                    exit_code = ?code,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "worker exited"
                );
                Termination::Exited { code, artifacts }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "failed to wait for worker");
                Termination::Exited {
                    code: None,
                    artifacts: None,
                }
            }
        };

        job.finish(termination);
        remove_input(&input).await;
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(WorkerCommand::default(), ArtifactLocator::default())
    }
}

async fn drain_readers(job: &Job, readers: Vec<JoinHandle<()>>, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    for mut reader in readers {
        match tokio::time::timeout_at(deadline, &mut reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job.id(), error = %e, "output reader task failed");
            }
            Err(_) => {
                reader.abort();
                tracing::warn!(
                    job_id = %job.id(),
                    timeout_ms = timeout.as_millis() as u64,
                    "worker output still open after exit, abandoning reader"
                );
            }
        }
    }
}

fn spawn_reader<R>(job: Arc<Job>, stream: LogStream, mut reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut decoder = Utf8ChunkDecoder::default();
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    if !text.is_empty() {
                        job.log(stream, text);
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id(), ?stream, error = %e, "worker pipe read failed");
                    break;
                }
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            job.log(stream, tail);
        }
    })
}

/// Best-effort removal of the uploaded input. Failures are only logged.
async fn remove_input(path: &Path) {
    if let Err(e) = try_remove(path).await {
        tracing::warn!(error = %e, "could not remove job input");
    }
}

async fn try_remove(path: &Path) -> Result<(), JobError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JobError::io(path, e)),
    }
}

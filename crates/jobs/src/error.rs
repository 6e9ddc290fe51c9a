use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the job orchestration engine.
#[derive(Debug, Error)]
pub enum JobError {
    /// A subscribe request named a job that is not (or no longer) registered.
    #[error("Unknown job id")]
    UnknownJob(String),

    #[error("Failed to start worker {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    pub fn unknown_job(id: impl Into<String>) -> Self {
        Self::UnknownJob(id.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_job_message_hides_id() {
        let err = JobError::unknown_job("not-a-job");
        assert_eq!(err.to_string(), "Unknown job id");
    }

    #[test]
    fn test_spawn_message() {
        let err = JobError::Spawn {
            program: PathBuf::from("/opt/missing"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to start worker /opt/missing"));
    }
}

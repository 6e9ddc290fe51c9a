//! End-to-end job lifecycles through the public registry API.
//!
//! Workers are simulated with `/bin/sh -c` scripts that receive the input
//! path as `$1` and the output path as `$2`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use docflow_jobs::{
    ArtifactLocator, JobError, JobEvent, JobRegistry, JobStatus, LogStream, SinkMessage,
    Subscription, Supervisor, WorkerCommand,
};
use pretty_assertions::assert_eq;

fn registry(script: &str) -> Arc<JobRegistry> {
    let command = WorkerCommand::new("/bin/sh", ["-c", script, "worker", "{input}", "{output}"]);
    Arc::new(
        JobRegistry::new(Supervisor::new(command, ArtifactLocator::default()))
            .with_heartbeat_interval(Duration::from_secs(60)),
    )
}

fn upload(dir: &Path) -> (PathBuf, PathBuf) {
    let input = dir.join("upload.pdf");
    std::fs::write(&input, b"%PDF-1.4 test").unwrap();
    (input, dir.join("upload.md"))
}

/// Collect events until `done` (or a terminal status snapshot), ignoring
/// heartbeats.
async fn events_until_done(sub: &mut Subscription) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for job events");
        match msg {
            Some(SinkMessage::Event(event)) => {
                let done = event.is_final();
                events.push(event);
                if done {
                    return events;
                }
            }
            Some(SinkMessage::Heartbeat) => {}
            None => return events,
        }
    }
}

async fn wait_terminal(registry: &JobRegistry, id: &docflow_jobs::JobId) -> JobStatus {
    for _ in 0..200 {
        let status = registry.get_job(id).unwrap().status();
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job never reached a terminal state");
}

#[tokio::test]
async fn scenario_a_successful_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(r#"sleep 0.2; printf 'page 1 done\n'; echo '# converted' > "$2""#);
    let (input, output) = upload(dir.path());

    let id = registry.start_job(&input, &output);
    let mut sub = registry.subscribe(&id).unwrap();
    let events = events_until_done(&mut sub).await;

    let mut urls = docflow_jobs::DownloadUrls::new();
    urls.insert("md".into(), "/downloads/upload.md".into());
    assert_eq!(
        events,
        vec![
            JobEvent::Status {
                status: JobStatus::Running
            },
            JobEvent::Log {
                stream: LogStream::Stdout,
                message: "page 1 done\n".into()
            },
            JobEvent::Done {
                ok: true,
                code: Some(0),
                download_urls: Some(urls),
            },
        ]
    );
    assert_eq!(wait_terminal(&registry, &id).await, JobStatus::Finished);
}

#[tokio::test]
async fn scenario_b_missing_executable() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(JobRegistry::new(Supervisor::new(
        WorkerCommand::new("/definitely/not/a/worker", ["{input}", "{output}"]),
        ArtifactLocator::default(),
    )));
    let (input, output) = upload(dir.path());

    let id = registry.start_job(&input, &output);
    let mut sub = registry.subscribe(&id).unwrap();
    let events = events_until_done(&mut sub).await;

    // The launch may fail before or after we attach; either way the
    // subscriber ends with error + done and never sees running again.
    let tail: Vec<&JobEvent> = events.iter().skip(1).collect();
    match events.first() {
        Some(JobEvent::Status {
            status: JobStatus::Running,
        }) => {
            assert_eq!(tail.len(), 2);
            match tail[0] {
                JobEvent::Error { message } => assert!(message.contains("Failed to start")),
                other => panic!("expected error event, got {other:?}"),
            }
            assert_eq!(
                tail[1],
                &JobEvent::Done {
                    ok: false,
                    code: None,
                    download_urls: None,
                }
            );
        }
        Some(JobEvent::Status {
            status: JobStatus::Error,
        }) => assert!(tail.is_empty()),
        other => panic!("unexpected first event {other:?}"),
    }

    assert_eq!(wait_terminal(&registry, &id).await, JobStatus::Error);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.get_job(&id).unwrap().status(), JobStatus::Error);
    assert!(!input.exists());
}

#[tokio::test]
async fn scenario_c_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry("sleep 0.2; exit 2");
    let (input, output) = upload(dir.path());

    let id = registry.start_job(&input, &output);
    let mut sub = registry.subscribe(&id).unwrap();
    let events = events_until_done(&mut sub).await;

    assert_eq!(
        events.last(),
        Some(&JobEvent::Done {
            ok: false,
            code: Some(2),
            download_urls: None,
        })
    );
    let json = serde_json::to_value(events.last().unwrap()).unwrap();
    assert!(json["downloadUrls"].is_null());
    assert_eq!(wait_terminal(&registry, &id).await, JobStatus::Failed);
}

#[tokio::test]
async fn scenario_d_unknown_job() {
    let registry = registry("exit 0");
    let err = registry.subscribe_raw("does-not-exist").unwrap_err();
    assert!(matches!(err, JobError::UnknownJob(_)));
    assert_eq!(err.to_string(), "Unknown job id");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn scenario_e_two_subscribers_see_same_events() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(
        r#"sleep 0.2; for i in 1 2 3; do echo "page $i"; sleep 0.02; done; echo ok > "$2""#,
    );
    let (input, output) = upload(dir.path());

    let id = registry.start_job(&input, &output);
    let mut first = registry.subscribe(&id).unwrap();
    let mut second = registry.subscribe(&id).unwrap();

    let (a, b) = tokio::join!(events_until_done(&mut first), events_until_done(&mut second));
    assert_eq!(a, b);
    assert!(a.last().unwrap().is_done());
    assert_eq!(a.iter().filter(|e| e.is_done()).count(), 1);
}

#[tokio::test]
async fn output_missing_after_clean_exit_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry("sleep 0.1; echo 'nothing written'");
    let (input, output) = upload(dir.path());

    let id = registry.start_job(&input, &output);
    let mut sub = registry.subscribe(&id).unwrap();
    let events = events_until_done(&mut sub).await;

    assert_eq!(
        events.last(),
        Some(&JobEvent::Done {
            ok: false,
            code: Some(0),
            download_urls: None,
        })
    );
    assert_eq!(wait_terminal(&registry, &id).await, JobStatus::Failed);
}

#[tokio::test]
async fn late_subscriber_gets_terminal_snapshot_only() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(r#"echo '# doc' > "$2""#);
    let (input, output) = upload(dir.path());

    let id = registry.start_job(&input, &output);
    assert_eq!(wait_terminal(&registry, &id).await, JobStatus::Finished);

    let mut late = registry.subscribe(&id).unwrap();
    assert_eq!(
        late.recv().await,
        Some(SinkMessage::Event(JobEvent::Status {
            status: JobStatus::Finished
        }))
    );
    let next = tokio::time::timeout(Duration::from_millis(200), late.recv()).await;
    assert!(next.is_err(), "no events may follow a terminal snapshot");
}

#[tokio::test]
async fn subscriber_disconnect_does_not_affect_job() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(r#"sleep 0.3; echo '# doc' > "$2""#);
    let (input, output) = upload(dir.path());

    let id = registry.start_job(&input, &output);
    let sub = registry.subscribe(&id).unwrap();
    drop(sub);
    assert_eq!(registry.get_job(&id).unwrap().subscriber_count(), 0);

    assert_eq!(wait_terminal(&registry, &id).await, JobStatus::Finished);
    assert!(output.exists());
}

// crates/server/src/routes/jobs.rs
//! API routes for conversion jobs.
//!
//! - POST /jobs - upload a document and start a worker for it
//! - GET /jobs/{id} - current snapshot of a job
//! - GET /jobs/{id}/events - SSE stream of a job's events

use std::convert::Infallible;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use docflow_jobs::{JobEvent, JobId, JobSnapshot, SinkMessage};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, UploadSettings};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Name of the multipart field carrying the document.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

/// POST /api/jobs - accept one document and start converting it.
///
/// The upload is stored as `<uploads_dir>/<uuid>.<ext>` and the worker is
/// told to write `<outputs_dir>/<uuid>.<output_ext>`.
async fn create_job(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<CreateJobResponse>> {
    let settings = &state.uploads;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, settings.max_upload_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let extension = accepted_extension(settings, &file_name)?;

        let stem = Uuid::new_v4();
        let input = settings.uploads_dir.join(format!("{stem}.{extension}"));
        let size = store_field(field, &input, settings.max_upload_bytes).await?;
        if size == 0 {
            discard(&input).await;
            return Err(ApiError::BadRequest("Uploaded file is empty".into()));
        }

        let output = settings
            .outputs_dir
            .join(format!("{stem}.{}", settings.output_extension));
        let job_id = state.registry.start_job(&input, output);
        tracing::info!(job_id = %job_id, file_name = %file_name, bytes = size, "upload accepted");

        return Ok(Json(CreateJobResponse { job_id }));
    }

    Err(ApiError::BadRequest(format!(
        "Missing '{FILE_FIELD}' field"
    )))
}

/// GET /api/jobs/{id} - job snapshot.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job = id
        .parse::<JobId>()
        .ok()
        .and_then(|job_id| state.registry.get_job(&job_id))
        .ok_or_else(|| ApiError::NotFound(id.clone()))?;
    Ok(Json(job.snapshot()))
}

/// GET /api/jobs/{id}/events - SSE stream of one job.
///
/// Emits the current `status` first, then `log`/`error`/`done` events as the
/// worker progresses, and a `: heartbeat` comment on every keep-alive tick.
/// The stream ends after `done`, or right after the greeting if the job had
/// already finished. Unknown ids get a single `error` event.
async fn job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.registry.subscribe_raw(&id);

    let stream = async_stream::stream! {
        match subscription {
            Err(err) => {
                tracing::warn!(job_id = %id, error = %err, "events requested for unknown job");
                yield Ok(sse_event(&JobEvent::Error { message: err.to_string() }));
            }
            Ok(mut subscription) => {
                while let Some(message) = subscription.recv().await {
                    match message {
                        SinkMessage::Heartbeat => yield Ok(Event::default().comment("heartbeat")),
                        SinkMessage::Event(event) => {
                            let last = event.is_final();
                            yield Ok(sse_event(&event));
                            if last {
                                break;
                            }
                        }
                    }
                }
                tracing::debug!(job_id = %subscription.job().id(), "event stream closed");
            }
        }
    };

    Sse::new(stream)
}

fn sse_event(event: &JobEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.name()).data(json)
}

/// Lowercase extension of `file_name`, if the upload settings allow it.
fn accepted_extension(settings: &UploadSettings, file_name: &str) -> ApiResult<String> {
    FsPath::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| settings.accepts(ext))
        .ok_or_else(|| {
            let allowed: Vec<String> = settings
                .allowed_extensions
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect();
            ApiError::BadRequest(format!("Only {} files are accepted", allowed.join(", ")))
        })
}

/// Stream one multipart field to `path`. Removes the partial file on error.
async fn store_field(mut field: Field<'_>, path: &FsPath, limit: usize) -> ApiResult<usize> {
    let result = write_field(&mut field, path, limit).await;
    if result.is_err() {
        discard(path).await;
    }
    result
}

async fn write_field(field: &mut Field<'_>, path: &FsPath, limit: usize) -> ApiResult<usize> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ApiError::io(path, e))?;

    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        written += chunk.len();
        if written > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::io(path, e))?;
    }
    file.flush().await.map_err(|e| ApiError::io(path, e))?;
    Ok(written)
}

async fn discard(path: &FsPath) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove rejected upload");
        }
    }
}

fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Build the jobs router. `max_upload_bytes` caps the request body.
pub fn router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/jobs",
            post(create_job).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/events", get(job_events))
}

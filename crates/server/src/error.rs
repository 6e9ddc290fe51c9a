// crates/server/src/error.rs
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::PayloadTooLarge { limit } => {
                tracing::warn!(limit, "Upload rejected: too large");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::with_details(
                        "Upload too large",
                        format!("Maximum upload size is {limit} bytes"),
                    ),
                )
            }
            ApiError::NotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {id}")),
                )
            }
            ApiError::Io { path, source } => {
                tracing::error!(path = %path.display(), error = %source, "IO error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Could not store upload"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn extract_error(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_has_details() {
        let response = ApiError::BadRequest("Only .pdf files are accepted".into()).into_response();
        let (status, body) = extract_error(response).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Bad request");
        assert_eq!(body.details.as_deref(), Some("Only .pdf files are accepted"));
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let (status, body) = extract_error(ApiError::PayloadTooLarge { limit: 10 }.into_response()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body.details.unwrap().contains("10 bytes"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let (status, body) = extract_error(ApiError::NotFound("abc".into()).into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Job not found");
    }

    #[tokio::test]
    async fn test_io_error_hides_path() {
        let err = ApiError::io(
            "/srv/uploads/x.pdf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let (status, body) = extract_error(err.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.details.is_none());
    }

    #[test]
    fn test_error_response_omits_empty_details() {
        let json = serde_json::to_string(&ErrorResponse::new("oops")).unwrap();
        assert_eq!(json, r#"{"error":"oops"}"#);
    }
}

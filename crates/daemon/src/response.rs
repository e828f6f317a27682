//! Translation of operation outcomes into HTTP responses.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::messages::ErrorBody;
use protocol::{OperationResult, OperationStatus};

use crate::files::FileError;

/// HTTP status for an outcome kind.
pub fn status_code(status: OperationStatus) -> StatusCode {
    match status {
        OperationStatus::Success => StatusCode::OK,
        OperationStatus::NotFound => StatusCode::NOT_FOUND,
        OperationStatus::Conflict => StatusCode::CONFLICT,
        OperationStatus::PermissionDenied => StatusCode::FORBIDDEN,
        OperationStatus::InvalidInput => StatusCode::BAD_REQUEST,
        OperationStatus::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for FileError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Storage { path, source } => {
                tracing::error!(path = ?path, error = %source, "storage_failure");
            }
            other => tracing::debug!(status = status.as_str(), error = %other, "request_rejected"),
        }

        let body = Json(ErrorBody {
            status,
            message: self.client_message(),
        });

        let code = match self {
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => status_code(status),
        };
        (code, body).into_response()
    }
}

/// A single-operation result, answered with the status its kind maps to.
#[derive(Debug)]
pub struct OperationResponse(pub OperationResult);

impl IntoResponse for OperationResponse {
    fn into_response(self) -> Response {
        (status_code(self.0.status), Json(self.0)).into_response()
    }
}

/// Rejected request bodies, with the body limit kept apart from other errors.
fn rejected(status: StatusCode, message: String) -> FileError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        FileError::TooLarge(message)
    } else {
        FileError::InvalidInput(message)
    }
}

impl From<JsonRejection> for FileError {
    fn from(rejection: JsonRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for FileError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<MultipartRejection> for FileError {
    fn from(rejection: MultipartRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for FileError {
    fn from(err: MultipartError) -> Self {
        rejected(err.status(), err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::path::PathBuf;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(OperationStatus::Success), StatusCode::OK);
        assert_eq!(status_code(OperationStatus::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_code(OperationStatus::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_code(OperationStatus::PermissionDenied),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_code(OperationStatus::InvalidInput),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_code(OperationStatus::StorageFailure),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = FileError::NotFound("docs/a.txt".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["status"], "not_found");
        assert_eq!(body["message"], "not found: docs/a.txt");
    }

    #[tokio::test]
    async fn test_too_large_answers_413() {
        let response = FileError::TooLarge("length limit exceeded".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = body_json(response).await;
        assert_eq!(body["status"], "invalid_input");
    }

    #[test]
    fn test_rejected_keeps_body_limit() {
        assert!(matches!(
            rejected(StatusCode::PAYLOAD_TOO_LARGE, "too big".to_string()),
            FileError::TooLarge(_)
        ));
        assert!(matches!(
            rejected(StatusCode::BAD_REQUEST, "bad".to_string()),
            FileError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_hides_detail() {
        let response = FileError::Storage {
            path: PathBuf::from("/srv/private/root/a.txt"),
            source: std::io::Error::other("disk on fire"),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["status"], "storage_failure");
        assert!(!body["message"].as_str().unwrap().contains("/srv/private"));
    }

    #[tokio::test]
    async fn test_operation_response() {
        let response =
            OperationResponse(OperationResult::success("deleted").with_path("a.txt")).into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["path"], "a.txt");
    }
}

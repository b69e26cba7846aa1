//! Application error type mapping to HTTP status codes and `{error}` bodies.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use leadflow_core::workflow::runner::RunnerError;
use leadflow_types::error::RepositoryError;

#[derive(Debug)]
pub enum AppError {
    /// Invocation failed as a whole.
    Runner(RunnerError),
    Repository(RepositoryError),
    /// Request body could not be parsed.
    BadRequest(String),
    NotFound(String),
}

impl From<RunnerError> for AppError {
    fn from(e: RunnerError) -> Self {
        AppError::Runner(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Runner(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Repository(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_runner_errors_are_500() {
        let resp = AppError::from(RunnerError::WorkflowNotFound(Uuid::now_v7())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = AppError::from(RunnerError::Configuration("RESEND_API_KEY".to_string()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_is_404() {
        let resp = AppError::NotFound("enrollment not found".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

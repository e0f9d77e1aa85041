use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use groundrag::{ErrorKind, PipelineFailure, PromptError};
use serde_json::json;
use tracing::error;

/// A custom error type for the server application.
///
/// This enum encapsulates different kinds of errors that can occur within the server,
/// allowing them to be converted into appropriate HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// A request that the pipeline moved to `Failed`.
    Pipeline(PipelineFailure),
    /// Errors originating from provider setup in `groundrag`.
    Prompt(PromptError),
    /// Generic internal server errors.
    Internal(anyhow::Error),
}

impl From<PipelineFailure> for AppError {
    fn from(err: PipelineFailure) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<PromptError> for AppError {
    fn from(err: PromptError) -> Self {
        AppError::Prompt(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

/// Maps a pipeline error kind to its HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyQuery => StatusCode::BAD_REQUEST,
        ErrorKind::MalformedExpansion
        | ErrorKind::CitationValidation
        | ErrorKind::Generation => StatusCode::BAD_GATEWAY,
        ErrorKind::Retrieval | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, kind, message) = match self {
            AppError::Pipeline(failure) => {
                let kind = failure.error.kind();
                error!(?kind, trace = ?failure.trace, "Pipeline failure: {}", failure.error);
                (status_for(kind), json!(kind), failure.error.to_string())
            }
            AppError::Prompt(err) => {
                error!("PromptError: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("internal"),
                    "Server is not configured correctly.".to_string(),
                )
            }
            AppError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("internal"),
                    "An internal server error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": { "kind": kind, "message": message },
        }));

        (status_code, body).into_response()
    }
}

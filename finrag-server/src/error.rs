//! Service-level errors and their HTTP mapping.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use finrag::RagError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the analysis service.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An environment variable or setting could not be used.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upload request was malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Retrieval, extraction or generation failed.
    #[error(transparent)]
    Analysis(#[from] RagError),

    /// The analysis did not finish within the request deadline.
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    /// A background task failed unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A convenience result type for the service.
pub type Result<T> = std::result::Result<T, ServerError>;

/// JSON error body, `{"detail": "..."}`.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Config(_) | ServerError::Analysis(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(%status, error = %self, "analysis request failed");
        }

        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}

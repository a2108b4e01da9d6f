use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Errors returned by the audio API handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// No record with the requested ID
    #[error("Audio file not found")]
    NotFound,

    /// Multipart body did not carry the expected file field
    #[error("Missing required field: '{0}'")]
    MissingField(&'static str),

    /// Reading the upload or storing it failed
    #[error("Error uploading audio file: {0:#}")]
    Upload(anyhow::Error),

    /// Looking up the record failed
    #[error("Error retrieving audio file: {0:#}")]
    Retrieval(anyhow::Error),
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upload(_) | ApiError::Retrieval(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, "Request failed");
            metrics::counter!("audio.errors").increment(1);
        } else if status == StatusCode::NOT_FOUND {
            metrics::counter!("audio.not_found").increment(1);
        }

        let body = ErrorResponse {
            detail: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

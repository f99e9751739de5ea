use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::documents::ExtractionError;
use crate::ranking::harness::Exhaustion;
use crate::ranking::sink::SinkError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// A validated-generation stage ran out of attempts.
    #[error("Generation failed: {}", .0.message())]
    Generation(Exhaustion),

    #[error("Result sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<Exhaustion> for AppError {
    fn from(exhaustion: Exhaustion) -> Self {
        AppError::Generation(exhaustion)
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

impl From<ExtractionError> for AppError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::UnsupportedType { .. } => AppError::UnsupportedFile(e.to_string()),
            ExtractionError::Task(_) => AppError::Internal(anyhow::Error::new(e)),
            other => AppError::UnprocessableEntity(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnsupportedFile(msg) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_FILE", msg.clone())
            }
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Generation(exhaustion) => {
                tracing::error!(
                    stage = %exhaustion.stage,
                    attempts = exhaustion.attempts,
                    "Generation failed: {}",
                    exhaustion.last_failure
                );
                (
                    StatusCode::BAD_GATEWAY,
                    "GENERATION_FAILED",
                    exhaustion.message().to_string(),
                )
            }
            AppError::Sink(e) => {
                tracing::error!("Result sink error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SINK_ERROR",
                    "Failed to save the score table".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

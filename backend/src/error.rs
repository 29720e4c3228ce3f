use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;
use std::path::PathBuf;

/// Startup failure. Leaves the service in degraded mode until restart.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model artifact not found: {0}")]
    Missing(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse meta model {path}: {source}")]
    Artifact {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Runtime failed to load {path}: {reason}")]
    Runtime { path: PathBuf, reason: String },
    #[error("Invalid meta model: {0}")]
    Shape(String),
    #[error("Anemic label {label} not present in meta model classes {classes:?}")]
    LabelMissing { label: i64, classes: Vec<i64> },
    #[error("Meta model class name at index {index} is '{found}', expected '{expected}'")]
    LabelMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("Backend '{0}' is not compiled into this build")]
    BackendUnavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Uploaded file is empty")]
    Empty,
    #[error("Uploaded file is not a valid image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Decoded image has unexpected shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("{model} failed during evaluation: {reason}")]
    Model { model: String, reason: String },
    #[error("{model} produced no output")]
    EmptyOutput { model: String },
    #[error("Meta model output has no column {index} (width {width})")]
    MissingClass { index: usize, width: usize },
    #[error("Non-finite probability from {0}")]
    NonFinite(String),
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Error surfaced by the HTTP layer; the status code tells "not ready"
/// apart from "bad input" and "internal failure".
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("Models are not loaded or failed to load. API is not operational.")]
    ModelsUnavailable,
    #[error("No file uploaded")]
    MissingFile,
    #[error("Malformed upload: {0}")]
    Upload(String),
    #[error("Uploaded file exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Model inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Worker pool error: {0}")]
    Blocking(String),
}

impl ResponseError for ScreenError {
    fn status_code(&self) -> StatusCode {
        match self {
            ScreenError::ModelsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ScreenError::MissingFile | ScreenError::Upload(_) | ScreenError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            ScreenError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ScreenError::Inference(_) | ScreenError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

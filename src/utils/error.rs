use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::path::Path;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reading the process tables
    #[error("procfs error: {0}")]
    Proc(#[from] procfs::ProcError),

    /// Error spawning or supervising the bandwidth sampler
    #[error("Sampler error: {0}")]
    Sampler(String),

    /// Error from parsing a kernel table or sampler output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// I/O failure on `path`, keeping the original error kind
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        AppError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }))
    }
}

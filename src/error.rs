//! Top-level application error and its HTTP translation.
//!
//! Collector and Scanner failures never reach this type — they're folded
//! into the records they produce (`Metric.error`, degraded
//! `DiscoveredDevice`s). This is for the handler layer: lookups that miss,
//! bad input, storage failures, and job-state queries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("job timed out")]
    JobTimeout,
    #[error("job evicted")]
    JobEvicted,
    #[error("internal failure: {0}")]
    InternalFailure(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => AppError::NotFound,
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::Storage(msg) => AppError::InternalFailure(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // JobTimeout and JobEvicted are reported in a 200 body with an error
        // field, never as an HTTP error status — a scan job that timed out
        // is still a successfully-answered status query.
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Conflict(_) | AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::JobTimeout | AppError::JobEvicted => (StatusCode::OK, self.to_string()),
            AppError::InternalFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

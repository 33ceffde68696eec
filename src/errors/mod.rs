//! Error handling module for the HTTP layer.
//!
//! Maps data-layer failures to status codes and a JSON error envelope. Store
//! details (keys, upstream bodies) are logged, never returned to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::data::RepositoryError;
use crate::store::StoreError;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const NOT_CONFIGURED: &str = "NOT_CONFIGURED";
    pub const STORE_ERROR: &str = "STORE_ERROR";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Resource not found
    NotFound(String),
    /// Malformed or incomplete request
    Validation(String),
    /// Store access is not configured on this server
    NotConfigured(String),
    /// The remote store is rate limiting us
    RateLimited,
    /// Any other store failure
    Store,
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::NotConfigured(_) => codes::NOT_CONFIGURED,
            AppError::RateLimited => codes::RATE_LIMITED,
            AppError::Store => codes::STORE_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::NotFound(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::NotConfigured(msg) => msg.clone(),
            AppError::RateLimited => "Storage is busy, please retry shortly".to_string(),
            AppError::Store => "Failed to save data".to_string(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::NotConfigured(bin) => {
                tracing::error!("Write rejected: {} bin not configured", bin);
                AppError::NotConfigured(format!("Storage for {} data is not configured", bin))
            }
            RepositoryError::Store(StoreError::RateLimited) => AppError::RateLimited,
            RepositoryError::Store(StoreError::MissingApiKey) => {
                tracing::error!("Write rejected: store API key not configured");
                AppError::NotConfigured("Storage is not configured".to_string())
            }
            RepositoryError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                AppError::Store
            }
        }
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        (status, Json(body)).into_response()
    }
}

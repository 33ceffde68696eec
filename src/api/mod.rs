//! REST API module.
//!
//! Thin handlers over the repository. Every success is wrapped in the
//! `{success, data}` envelope; failures go through [`AppError`].

mod appointments;
mod candidates;
mod slot_notes;
mod votes;

pub use appointments::*;
pub use candidates::*;
pub use slot_notes::*;
pub use votes::*;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Reject blank required text fields.
fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// POST /api/cache/invalidate - Drop cached documents so the next reads hit the store.
pub async fn invalidate_cache(State(state): State<AppState>) -> ApiResult<()> {
    state.repo.invalidate_cache();
    tracing::debug!("Document cache invalidated");
    success(())
}

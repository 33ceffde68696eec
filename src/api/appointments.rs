//! Appointment API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    Appointment, Comment, CreateAppointmentRequest, CreateCommentRequest,
    UpdateAppointmentRequest,
};
use crate::AppState;

fn validate_time(value: &str, field: &str) -> Result<(), AppError> {
    chrono::NaiveTime::parse_from_str(value, "%H:%M")
        .map(|_| ())
        .map_err(|_| AppError::Validation(format!("Invalid {} '{}', expected HH:MM", field, value)))
}

fn validate_date(value: &str) -> Result<(), AppError> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| AppError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", value)))
}

/// GET /api/appointments - List all appointments.
pub async fn list_appointments(State(state): State<AppState>) -> ApiResult<Vec<Appointment>> {
    success(state.repo.read_appointments().await)
}

/// PUT /api/appointments - Replace the appointment list.
pub async fn replace_appointments(
    State(state): State<AppState>,
    Json(appointments): Json<Vec<Appointment>>,
) -> ApiResult<usize> {
    for appointment in &appointments {
        require(&appointment.id, "Appointment id")?;
        require(&appointment.title, "Title")?;
        appointment.kind.validate().map_err(AppError::Validation)?;
    }

    let count = appointments.len();
    state.repo.write_appointments(appointments).await?;
    success(count)
}

/// POST /api/appointments - Create an appointment.
pub async fn create_appointment(
    State(state): State<AppState>,
    Json(request): Json<CreateAppointmentRequest>,
) -> ApiResult<Appointment> {
    require(&request.title, "Title")?;
    validate_date(&request.date)?;
    validate_time(&request.start_time, "startTime")?;
    validate_time(&request.end_time, "endTime")?;
    request.kind.validate().map_err(AppError::Validation)?;

    let appointment = state.repo.create_appointment(request).await?;
    tracing::info!(appointment_id = %appointment.id, "Appointment created");
    success(appointment)
}

/// PUT /api/appointments/:id - Update selected fields of an appointment.
pub async fn update_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> ApiResult<Appointment> {
    if let Some(title) = &request.title {
        require(title, "Title")?;
    }
    if let Some(date) = &request.date {
        validate_date(date)?;
    }
    if let Some(start) = &request.start_time {
        validate_time(start, "startTime")?;
    }
    if let Some(end) = &request.end_time {
        validate_time(end, "endTime")?;
    }
    if let Some(kind) = &request.kind {
        kind.validate().map_err(AppError::Validation)?;
    }

    success(state.repo.update_appointment(&id, &request).await?)
}

/// DELETE /api/appointments/:id - Remove an appointment.
pub async fn delete_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.repo.delete_appointment(&id).await?;
    tracing::info!(appointment_id = %id, "Appointment deleted");
    success(())
}

/// POST /api/appointments/:id/comments - Append a comment.
pub async fn add_appointment_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<Comment> {
    require(&request.text, "Text")?;

    success(state.repo.add_appointment_comment(&id, request).await?)
}

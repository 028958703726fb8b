use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::db::models::{BookingRecord, NewBookingRequest};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthedInstructor;

pub async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<NewBookingRequest>,
) -> AppResult<(StatusCode, Json<BookingRecord>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let booking = state.coordinator.book(payload).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn approve_booking(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingRecord>> {
    let booking = state.coordinator.approve(instructor.id, id).await?;
    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingRecord>> {
    let booking = state.coordinator.cancel(instructor.id, id).await?;
    Ok(Json(booking))
}

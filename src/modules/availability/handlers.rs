use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::availability::Slot;
use crate::db::models::{
    ManualBlock, NewManualBlock, NewWeeklyTemplate, UpdateWeeklyTemplate,
    WeeklyAvailabilityTemplate,
};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthedInstructor;

const DEFAULT_SLOT_MINUTES: u32 = 60;
// One UTC day; longer requests cannot produce a slot anyway.
const MAX_SLOT_MINUTES: u32 = 24 * 60;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub instructor_id: Uuid,
    pub slot_duration: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub date: String,
    pub instructor_id: Uuid,
    pub slot_duration_minutes: u32,
    pub slots: Vec<Slot>,
}

pub async fn get_availability(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<AvailabilityResponse>> {
    let parsed = Date::parse(&date, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::Validation(format!("invalid date: {date}")))?;

    let slot_duration = query.slot_duration.unwrap_or(DEFAULT_SLOT_MINUTES);
    if slot_duration == 0 || slot_duration > MAX_SLOT_MINUTES {
        return Err(AppError::Validation(format!(
            "slot_duration must be between 1 and {MAX_SLOT_MINUTES} minutes"
        )));
    }

    let slots = state
        .engine
        .free_slots(query.instructor_id, parsed, slot_duration)
        .await?;

    Ok(Json(AvailabilityResponse {
        date,
        instructor_id: query.instructor_id,
        slot_duration_minutes: slot_duration,
        slots,
    }))
}

pub async fn create_manual_block(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
    Json(payload): Json<NewManualBlock>,
) -> AppResult<(StatusCode, Json<ManualBlock>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let now = OffsetDateTime::now_utc();
    validate_block_window(payload.start_time, payload.end_time, now)?;

    let block = state
        .blocks
        .create(ManualBlock {
            id: Uuid::now_v7(),
            instructor_id: instructor.id,
            start_time: payload.start_time,
            end_time: payload.end_time,
            reason: payload.reason,
            created_at: now,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(block)))
}

fn validate_block_window(
    start: OffsetDateTime,
    end: OffsetDateTime,
    now: OffsetDateTime,
) -> AppResult<()> {
    if start >= end {
        return Err(AppError::Validation(
            "start_time must precede end_time".to_string(),
        ));
    }
    if start < now {
        return Err(AppError::Validation(
            "start_time is in the past".to_string(),
        ));
    }
    Ok(())
}

pub async fn list_weekly_hours(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
) -> AppResult<Json<Vec<WeeklyAvailabilityTemplate>>> {
    let templates = state.templates.list(instructor.id).await?;
    Ok(Json(templates))
}

pub async fn create_weekly_hours(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
    Json(payload): Json<NewWeeklyTemplate>,
) -> AppResult<(StatusCode, Json<WeeklyAvailabilityTemplate>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if payload.start_time >= payload.end_time {
        return Err(AppError::Validation(
            "start_time must precede end_time".to_string(),
        ));
    }

    let template = state
        .templates
        .create(WeeklyAvailabilityTemplate {
            id: Uuid::now_v7(),
            instructor_id: instructor.id,
            day_of_week: payload.day_of_week,
            start_time: payload.start_time,
            end_time: payload.end_time,
            active: payload.active.unwrap_or(true),
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn update_weekly_hours(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateWeeklyTemplate>,
) -> AppResult<Json<WeeklyAvailabilityTemplate>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut template = state
        .templates
        .get(instructor.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown weekly-hours template".to_string()))?;

    if let Some(day) = payload.day_of_week {
        template.day_of_week = day;
    }
    if let Some(start) = payload.start_time {
        template.start_time = start;
    }
    if let Some(end) = payload.end_time {
        template.end_time = end;
    }
    if let Some(active) = payload.active {
        template.active = active;
    }
    if template.start_time >= template.end_time {
        return Err(AppError::Validation(
            "start_time must precede end_time".to_string(),
        ));
    }

    let updated = state.templates.update(template).await?;
    Ok(Json(updated))
}

pub async fn delete_weekly_hours(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.templates.delete(instructor.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-03-02 12:00 UTC);

    #[test]
    fn block_window_rejects_inverted_range() {
        let err = validate_block_window(
            datetime!(2026-03-03 15:00 UTC),
            datetime!(2026-03-03 14:00 UTC),
            NOW,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn block_window_rejects_start_in_the_past() {
        // The end lies in the future; the past start alone disqualifies it.
        let err = validate_block_window(
            datetime!(2026-03-02 11:00 UTC),
            datetime!(2026-03-02 13:00 UTC),
            NOW,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn block_window_accepts_future_range() {
        assert!(validate_block_window(
            datetime!(2026-03-02 13:00 UTC),
            datetime!(2026-03-02 14:00 UTC),
            NOW,
        )
        .is_ok());
    }
}

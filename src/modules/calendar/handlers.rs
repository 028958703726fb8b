use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthedInstructor;

const CHANNEL_ID_HEADER: &str = "x-goog-channel-id";
const RESOURCE_ID_HEADER: &str = "x-goog-resource-id";
const RESOURCE_STATE_HEADER: &str = "x-goog-resource-state";

/// Provider push endpoint. Identity lives in the headers; the body is
/// ignored. Must answer promptly, so any cache refresh happens off the
/// request path.
pub async fn calendar_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let channel_id = header_str(&headers, CHANNEL_ID_HEADER)?;
    let resource_id = header_str(&headers, RESOURCE_ID_HEADER)?;
    let resource_state = header_str(&headers, RESOURCE_STATE_HEADER)?;

    state
        .bridge
        .on_notification(resource_id, channel_id, resource_state)
        .await?;
    Ok(StatusCode::OK)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("missing {name} header")))
}

#[derive(Debug, Deserialize)]
pub struct ConnectCalendarRequest {
    pub auth_code: String,
}

pub async fn connect_calendar(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
    Json(payload): Json<ConnectCalendarRequest>,
) -> AppResult<StatusCode> {
    if payload.auth_code.is_empty() {
        return Err(AppError::Validation("auth_code must not be empty".to_string()));
    }
    state.bridge.connect(instructor.id, &payload.auth_code).await?;
    Ok(StatusCode::CREATED)
}

pub async fn disconnect_calendar(
    State(state): State<AppState>,
    AuthedInstructor(instructor): AuthedInstructor,
) -> AppResult<StatusCode> {
    state.bridge.disconnect(instructor.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

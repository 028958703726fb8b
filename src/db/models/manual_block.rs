use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

/// Ad-hoc blocked interval (vacation, one-off commitment). Always
/// subtracts from availability.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ManualBlock {
    pub id: Uuid,
    pub instructor_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewManualBlock {
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    #[validate(length(max = 500, message = "reason too long"))]
    pub reason: Option<String>,
}

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A bookable offering (e.g. "60-minute lesson"), owned by one instructor.
/// `requires_approval` decides whether a fresh booking lands as `pending`
/// or `confirmed`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AppointmentType {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub requires_approval: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// `pending -> confirmed`, `pending|confirmed -> cancelled`;
    /// `cancelled` is terminal.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }

    /// Whether the booking still consumes its interval.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

/// A committed appointment. Created only by the booking coordinator; at
/// most one non-cancelled record may occupy an overlapping interval per
/// instructor (enforced by the `bookings_no_overlap` constraint).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BookingRecord {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub appointment_type_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub status: BookingStatus,
    pub student_name: String,
    pub student_email: String,
    pub student_phone: Option<String>,
    pub student_notes: Option<String>,
    pub party_size: Option<i32>,
    #[serde(skip_serializing)]
    pub external_event_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBookingRequest {
    pub instructor_id: Uuid,
    pub appointment_type_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    #[validate(length(min = 1, max = 200, message = "student_name is required"))]
    pub student_name: String,
    #[validate(email(message = "student_email must be a valid email"))]
    pub student_email: String,
    #[validate(length(max = 50))]
    pub student_phone: Option<String>,
    #[validate(length(max = 2000))]
    pub student_notes: Option<String>,
    #[validate(range(min = 1, max = 100, message = "party_size out of range"))]
    pub party_size: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::BookingStatus::*;

    #[test]
    fn status_state_machine() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn cancelled_frees_the_interval() {
        assert!(Pending.is_active());
        assert!(Confirmed.is_active());
        assert!(!Cancelled.is_active());
    }
}

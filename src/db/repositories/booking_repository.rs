use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::availability::Interval;
use crate::db::models::{BookingRecord, BookingStatus};
use crate::store::{BookingLedger, StoreResult};

const BOOKING_COLUMNS: &str = "id, instructor_id, appointment_type_id, start_time, end_time, \
     status, student_name, student_email, student_phone, student_notes, party_size, \
     external_event_id, created_at, updated_at";

/// Booking persistence backed by the `bookings` table. The
/// `bookings_no_overlap` exclusion constraint makes concurrent inserts
/// for the same slot collide inside Postgres, which surfaces here as
/// [`DatabaseError::Duplicate`].
///
/// [`DatabaseError::Duplicate`]: crate::db::DatabaseError::Duplicate
pub struct PgBookingLedger {
    pool: PgPool,
}

impl PgBookingLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingLedger for PgBookingLedger {
    async fn insert(&self, booking: BookingRecord) -> StoreResult<BookingRecord> {
        let created = sqlx::query_as::<_, BookingRecord>(&format!(
            r#"
            INSERT INTO bookings
                (id, instructor_id, appointment_type_id, start_time, end_time, status,
                 student_name, student_email, student_phone, student_notes, party_size,
                 external_event_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking.id)
        .bind(booking.instructor_id)
        .bind(booking.appointment_type_id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.status)
        .bind(booking.student_name)
        .bind(booking.student_email)
        .bind(booking.student_phone)
        .bind(booking.student_notes)
        .bind(booking.party_size)
        .bind(booking.external_event_id)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        let booking = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn active_overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookingRecord>> {
        let bookings = sqlx::query_as::<_, BookingRecord>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE instructor_id = $1
              AND status <> 'cancelled'
              AND start_time < $3 AND end_time > $2
            ORDER BY start_time
            "#
        ))
        .bind(instructor_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<BookingRecord>> {
        // Compare-and-set on the status column; a lost race returns None.
        let updated = sqlx::query_as::<_, BookingRecord>(&format!(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn set_external_event(
        &self,
        id: Uuid,
        external_event_id: Option<String>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE bookings SET external_event_id = $2 WHERE id = $1")
            .bind(id)
            .bind(external_event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! Booking coordinator: the sole writer of booking records.
//!
//! Commits use optimistic-then-verified semantics: availability is
//! re-derived from live state immediately before the insert, and the
//! insert itself is guarded by the ledger's overlap exclusion rule, so
//! two racing callers can never both win.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityEngine;
use crate::calendar::CalendarBridge;
use crate::db::models::{AppointmentType, BookingRecord, BookingStatus, NewBookingRequest};
use crate::db::DatabaseError;
use crate::error::{AppError, AppResult};
use crate::store::{AppointmentTypeStore, BookingLedger};

pub struct BookingCoordinator {
    engine: Arc<AvailabilityEngine>,
    ledger: Arc<dyn BookingLedger>,
    types: Arc<dyn AppointmentTypeStore>,
    bridge: Arc<CalendarBridge>,
}

impl BookingCoordinator {
    pub fn new(
        engine: Arc<AvailabilityEngine>,
        ledger: Arc<dyn BookingLedger>,
        types: Arc<dyn AppointmentTypeStore>,
        bridge: Arc<CalendarBridge>,
    ) -> Self {
        Self {
            engine,
            ledger,
            types,
            bridge,
        }
    }

    /// Commit a booking against a slot that must still be free, or
    /// reject. Never trusts a previously returned slot list.
    pub async fn book(&self, request: NewBookingRequest) -> AppResult<BookingRecord> {
        let appointment_type = self.load_type(&request).await?;
        let duration_minutes = validate_window(&request, &appointment_type)?;

        // Re-derive availability from live state; the caller's slot list
        // may be stale.
        let slots = self
            .engine
            .free_slots(request.instructor_id, request.start_time.date(), duration_minutes)
            .await?;
        let requested_is_free = slots
            .iter()
            .any(|s| s.start_time == request.start_time && s.end_time == request.end_time);
        if !requested_is_free {
            return Err(AppError::Conflict(
                "requested slot is no longer available".to_string(),
            ));
        }

        let status = if appointment_type.requires_approval {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        };
        let now = OffsetDateTime::now_utc();
        let record = BookingRecord {
            id: Uuid::now_v7(),
            instructor_id: request.instructor_id,
            appointment_type_id: request.appointment_type_id,
            start_time: request.start_time,
            end_time: request.end_time,
            status,
            student_name: request.student_name,
            student_email: request.student_email,
            student_phone: request.student_phone,
            student_notes: request.student_notes,
            party_size: request.party_size,
            external_event_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut booking = match self.ledger.insert(record).await {
            Ok(booking) => booking,
            // A racing writer won between our recheck and the insert;
            // the storage constraint is the final arbiter.
            Err(DatabaseError::Duplicate) => {
                return Err(AppError::Conflict(
                    "requested slot was booked concurrently".to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };
        info!(
            booking_id = %booking.id,
            instructor_id = %booking.instructor_id,
            status = ?booking.status,
            "booking committed"
        );

        // Mirror onto the instructor's calendar; the ledger insert is
        // authoritative and is never rolled back for a mirror failure.
        if let Some(event_id) = self.bridge.mirror_booking(&booking).await {
            if let Err(err) = self
                .ledger
                .set_external_event(booking.id, Some(event_id.clone()))
                .await
            {
                warn!(booking_id = %booking.id, %err, "storing mirrored event id failed");
            } else {
                booking.external_event_id = Some(event_id);
            }
        }

        Ok(booking)
    }

    /// `pending -> confirmed`. The transition is compare-and-set so a
    /// racing cancel cannot be overwritten.
    pub async fn approve(&self, instructor_id: Uuid, booking_id: Uuid) -> AppResult<BookingRecord> {
        let booking = self.load_owned(instructor_id, booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Confirmed) {
            return Err(AppError::Conflict(format!(
                "booking cannot be approved from status {:?}",
                booking.status
            )));
        }
        self.ledger
            .transition(booking_id, BookingStatus::Pending, BookingStatus::Confirmed)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("booking status changed concurrently".to_string())
            })
    }

    /// Cancel a pending or confirmed booking, freeing its interval for
    /// the next availability query.
    pub async fn cancel(&self, instructor_id: Uuid, booking_id: Uuid) -> AppResult<BookingRecord> {
        let booking = self.load_owned(instructor_id, booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(AppError::Conflict(
                "booking is already cancelled".to_string(),
            ));
        }
        let cancelled = self
            .ledger
            .transition(booking_id, booking.status, BookingStatus::Cancelled)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("booking status changed concurrently".to_string())
            })?;
        info!(booking_id = %cancelled.id, "booking cancelled");

        self.bridge.unmirror_booking(&cancelled).await;
        Ok(cancelled)
    }

    async fn load_type(&self, request: &NewBookingRequest) -> AppResult<AppointmentType> {
        let appointment_type = self
            .types
            .get(request.appointment_type_id)
            .await?
            .ok_or_else(|| AppError::NotFound("unknown appointment type".to_string()))?;
        // A type belonging to another instructor is a caller mistake,
        // not a scheduling conflict.
        if appointment_type.instructor_id != request.instructor_id {
            return Err(AppError::Validation(
                "appointment type does not belong to this instructor".to_string(),
            ));
        }
        Ok(appointment_type)
    }

    async fn load_owned(&self, instructor_id: Uuid, booking_id: Uuid) -> AppResult<BookingRecord> {
        let booking = self
            .ledger
            .get(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("unknown booking".to_string()))?;
        if booking.instructor_id != instructor_id {
            return Err(AppError::NotFound("unknown booking".to_string()));
        }
        Ok(booking)
    }
}

fn validate_window(
    request: &NewBookingRequest,
    appointment_type: &AppointmentType,
) -> AppResult<u32> {
    if request.start_time >= request.end_time {
        return Err(AppError::Validation(
            "start_time must precede end_time".to_string(),
        ));
    }
    if request.start_time < OffsetDateTime::now_utc() {
        return Err(AppError::Validation(
            "start_time is in the past".to_string(),
        ));
    }
    let span = request.end_time - request.start_time;
    if span != Duration::minutes(i64::from(appointment_type.duration_minutes)) {
        return Err(AppError::Validation(format!(
            "requested window must match the appointment type duration of {} minutes",
            appointment_type.duration_minutes
        )));
    }
    Ok(appointment_type.duration_minutes as u32)
}

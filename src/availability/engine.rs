use std::sync::Arc;

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime, Time};
use tracing::debug;
use uuid::Uuid;

use crate::availability::interval::{self, Interval};
use crate::db::models::WeeklyAvailabilityTemplate;
use crate::db::DatabaseError;
use crate::store::{BookingLedger, BusyCacheStore, ManualBlockStore, TemplateStore};

/// A candidate fixed-duration free window. Derived per query, never
/// persisted, and never reused as the basis for a commit decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub duration_minutes: u32,
}

/// Merges the four availability sources into a free timeline and slices
/// it into bookable slots. Holds no state of its own; every query reads
/// live store data.
pub struct AvailabilityEngine {
    templates: Arc<dyn TemplateStore>,
    blocks: Arc<dyn ManualBlockStore>,
    busy_cache: Arc<dyn BusyCacheStore>,
    ledger: Arc<dyn BookingLedger>,
}

impl AvailabilityEngine {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        blocks: Arc<dyn ManualBlockStore>,
        busy_cache: Arc<dyn BusyCacheStore>,
        ledger: Arc<dyn BookingLedger>,
    ) -> Self {
        Self {
            templates,
            blocks,
            busy_cache,
            ledger,
        }
    }

    /// Compute the bookable slots for one instructor on one UTC date.
    ///
    /// An empty result is a valid answer; this errors only when a data
    /// source is unreachable.
    pub async fn free_slots(
        &self,
        instructor_id: Uuid,
        date: Date,
        duration_minutes: u32,
    ) -> Result<Vec<Slot>, DatabaseError> {
        if duration_minutes == 0 {
            return Ok(Vec::new());
        }

        let weekday = i16::from(date.weekday().number_days_from_sunday());
        let templates = self.templates.active_for_day(instructor_id, weekday).await?;
        if templates.is_empty() {
            // No recurring hours on this weekday: nothing can be offered,
            // whatever the other sources say.
            return Ok(Vec::new());
        }

        let available = template_windows(date, &templates);
        let day = day_window(date);

        let mut busy: Vec<Interval> = Vec::new();
        busy.extend(
            self.blocks
                .overlapping(instructor_id, day)
                .await?
                .into_iter()
                .map(|b| Interval::new(b.start_time, b.end_time)),
        );
        busy.extend(
            self.busy_cache
                .overlapping(instructor_id, day)
                .await?
                .into_iter()
                .map(|e| Interval::new(e.start_time, e.end_time)),
        );
        busy.extend(
            self.ledger
                .active_overlapping(instructor_id, day)
                .await?
                .into_iter()
                .map(|b| Interval::new(b.start_time, b.end_time)),
        );

        let free = interval::subtract(available, busy);
        let slots = carve_slots(&free, duration_minutes);

        debug!(
            %instructor_id,
            %date,
            duration_minutes,
            free_windows = free.len(),
            slots = slots.len(),
            "computed availability"
        );

        Ok(slots)
    }
}

/// The full UTC day `[00:00, 00:00 next day)` containing `date`.
pub fn day_window(date: Date) -> Interval {
    let start = date.midnight().assume_utc();
    Interval::new(start, start + Duration::days(1))
}

/// Anchor each template's wall-clock window onto the concrete date.
fn template_windows(date: Date, templates: &[WeeklyAvailabilityTemplate]) -> Vec<Interval> {
    templates
        .iter()
        .map(|t| {
            Interval::new(
                at_time(date, t.start_time),
                at_time(date, t.end_time),
            )
        })
        .collect()
}

fn at_time(date: Date, time: Time) -> OffsetDateTime {
    date.with_time(time).assume_utc()
}

/// Walk each free window forward in non-overlapping `duration` steps.
/// A remainder shorter than the duration yields no slot. Steps that
/// would overflow the datetime range end the window early.
fn carve_slots(free: &[Interval], duration_minutes: u32) -> Vec<Slot> {
    let step = Duration::minutes(i64::from(duration_minutes));
    let mut slots = Vec::new();
    for window in free {
        let mut cursor = window.start;
        while let Some(end) = cursor.checked_add(step) {
            if end > window.end {
                break;
            }
            slots.push(Slot {
                start_time: cursor,
                end_time: end,
                duration_minutes,
            });
            cursor = end;
        }
    }
    slots
}

//! Store traits for every data source the engine reconciles.
//!
//! The Postgres implementations live in `db::repositories`; tests swap in
//! in-memory versions so the concurrency and webhook properties can be
//! exercised without a database.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::availability::Interval;
use crate::db::models::{
    AppointmentType, BookingRecord, BookingStatus, ExternalBusyEvent, ExternalCalendarLink,
    Instructor, ManualBlock, WeeklyAvailabilityTemplate,
};
use crate::db::DatabaseError;

pub type StoreResult<T> = Result<T, DatabaseError>;

#[async_trait]
pub trait InstructorStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Instructor>>;
    async fn find_by_api_key(&self, api_key: &str) -> StoreResult<Option<Instructor>>;
}

#[async_trait]
pub trait AppointmentTypeStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<AppointmentType>>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Active templates for one weekday (0 = Sunday), unordered.
    async fn active_for_day(
        &self,
        instructor_id: Uuid,
        day_of_week: i16,
    ) -> StoreResult<Vec<WeeklyAvailabilityTemplate>>;

    async fn list(&self, instructor_id: Uuid) -> StoreResult<Vec<WeeklyAvailabilityTemplate>>;

    async fn create(
        &self,
        template: WeeklyAvailabilityTemplate,
    ) -> StoreResult<WeeklyAvailabilityTemplate>;

    /// Replaces the stored row. `NotFound` if the id does not exist for
    /// this instructor.
    async fn update(
        &self,
        template: WeeklyAvailabilityTemplate,
    ) -> StoreResult<WeeklyAvailabilityTemplate>;

    async fn delete(&self, instructor_id: Uuid, id: Uuid) -> StoreResult<()>;

    async fn get(
        &self,
        instructor_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<WeeklyAvailabilityTemplate>>;
}

#[async_trait]
pub trait ManualBlockStore: Send + Sync {
    async fn create(&self, block: ManualBlock) -> StoreResult<ManualBlock>;
    async fn list(&self, instructor_id: Uuid) -> StoreResult<Vec<ManualBlock>>;
    async fn overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<ManualBlock>>;
    async fn delete(&self, instructor_id: Uuid, id: Uuid) -> StoreResult<()>;
}

/// The system of record for appointments. Insertion must be guarded by a
/// uniqueness/exclusion rule: no two active records for one instructor
/// with overlapping intervals. A violation surfaces as
/// [`DatabaseError::Duplicate`].
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn insert(&self, booking: BookingRecord) -> StoreResult<BookingRecord>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<BookingRecord>>;

    /// Pending and confirmed bookings overlapping the window.
    async fn active_overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookingRecord>>;

    /// Compare-and-set status transition. Returns `None` when the record
    /// is missing or no longer in `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<BookingRecord>>;

    async fn set_external_event(
        &self,
        id: Uuid,
        external_event_id: Option<String>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait CalendarLinkStore: Send + Sync {
    async fn upsert(&self, link: ExternalCalendarLink) -> StoreResult<()>;
    async fn get(&self, instructor_id: Uuid) -> StoreResult<Option<ExternalCalendarLink>>;
    async fn find_by_resource(
        &self,
        resource_id: &str,
    ) -> StoreResult<Option<ExternalCalendarLink>>;
    async fn expiring_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> StoreResult<Vec<ExternalCalendarLink>>;
    async fn update_channel(
        &self,
        instructor_id: Uuid,
        channel_id: &str,
        resource_id: &str,
        channel_expiry: OffsetDateTime,
    ) -> StoreResult<()>;
    async fn update_tokens(
        &self,
        instructor_id: Uuid,
        access_token: &str,
        token_expiry: OffsetDateTime,
    ) -> StoreResult<()>;
    async fn delete(&self, instructor_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait BusyCacheStore: Send + Sync {
    /// Replace the cached busy intervals for an instructor wholesale.
    async fn replace(
        &self,
        instructor_id: Uuid,
        events: Vec<ExternalBusyEvent>,
    ) -> StoreResult<()>;

    async fn overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<ExternalBusyEvent>>;

    /// Drop all cached intervals; availability then degrades to
    /// templates/blocks/ledger only.
    async fn purge(&self, instructor_id: Uuid) -> StoreResult<()>;
}

//! In-memory store and provider doubles for tests.
//!
//! The in-memory ledger performs its overlap check inside a single lock
//! acquisition, mirroring the storage-level exclusion constraint that
//! guards the Postgres implementation.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime, Time};
use uuid::Uuid;

use crate::availability::Interval;
use crate::calendar::provider::{
    CalendarProvider, ChannelLease, GrantExchange, ProviderBusyEvent, ProviderError, TokenRefresh,
};
use crate::db::models::{
    AppointmentType, BookingRecord, BookingStatus, ExternalBusyEvent, ExternalCalendarLink,
    ManualBlock, WeeklyAvailabilityTemplate,
};
use crate::db::DatabaseError;
use crate::store::{
    AppointmentTypeStore, BookingLedger, BusyCacheStore, CalendarLinkStore, ManualBlockStore,
    StoreResult, TemplateStore,
};

pub mod fixtures {
    use uuid::Uuid;

    pub fn instructor_id() -> Uuid {
        Uuid::from_u128(0xA11CE)
    }
}

pub struct InMemoryStores {
    pub templates: Arc<InMemoryTemplateStore>,
    pub blocks: Arc<InMemoryManualBlockStore>,
    pub busy_cache: Arc<InMemoryBusyCacheStore>,
    pub ledger: Arc<InMemoryBookingLedger>,
    pub links: Arc<InMemoryCalendarLinkStore>,
    pub types: Arc<InMemoryAppointmentTypeStore>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self {
            templates: Arc::new(InMemoryTemplateStore::default()),
            blocks: Arc::new(InMemoryManualBlockStore::default()),
            busy_cache: Arc::new(InMemoryBusyCacheStore::default()),
            ledger: Arc::new(InMemoryBookingLedger::default()),
            links: Arc::new(InMemoryCalendarLinkStore::default()),
            types: Arc::new(InMemoryAppointmentTypeStore::default()),
        }
    }

    pub async fn add_template(
        &self,
        instructor_id: Uuid,
        day_of_week: i16,
        start_time: Time,
        end_time: Time,
    ) -> WeeklyAvailabilityTemplate {
        self.templates
            .create(WeeklyAvailabilityTemplate {
                id: Uuid::now_v7(),
                instructor_id,
                day_of_week,
                start_time,
                end_time,
                active: true,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .expect("in-memory create cannot fail")
    }

    pub async fn add_block(
        &self,
        instructor_id: Uuid,
        start_time: OffsetDateTime,
        end_time: OffsetDateTime,
    ) -> ManualBlock {
        self.blocks
            .create(ManualBlock {
                id: Uuid::now_v7(),
                instructor_id,
                start_time,
                end_time,
                reason: None,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .expect("in-memory create cannot fail")
    }

    pub async fn add_busy_event(
        &self,
        instructor_id: Uuid,
        start_time: OffsetDateTime,
        end_time: OffsetDateTime,
    ) {
        let mut events = self.busy_cache.events.lock().unwrap();
        let seq = events.len();
        events.push(ExternalBusyEvent {
            id: Uuid::now_v7(),
            instructor_id,
            event_id: format!("seed-{seq}"),
            start_time,
            end_time,
        });
    }

    pub async fn add_booking(
        &self,
        instructor_id: Uuid,
        start_time: OffsetDateTime,
        end_time: OffsetDateTime,
        status: BookingStatus,
    ) -> BookingRecord {
        let now = OffsetDateTime::now_utc();
        self.ledger
            .insert(BookingRecord {
                id: Uuid::now_v7(),
                instructor_id,
                appointment_type_id: Uuid::now_v7(),
                start_time,
                end_time,
                status,
                student_name: "Test Student".to_string(),
                student_email: "student@example.com".to_string(),
                student_phone: None,
                student_notes: None,
                party_size: None,
                external_event_id: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed booking must not overlap")
    }

    pub async fn add_appointment_type(
        &self,
        instructor_id: Uuid,
        duration_minutes: i32,
        requires_approval: bool,
    ) -> Uuid {
        let id = Uuid::now_v7();
        self.types.items.lock().unwrap().push(AppointmentType {
            id,
            instructor_id,
            name: format!("{duration_minutes}-minute lesson"),
            duration_minutes,
            requires_approval,
            created_at: OffsetDateTime::now_utc(),
        });
        id
    }

    pub async fn add_link(&self, instructor_id: Uuid, resource_id: &str, channel_id: &str) {
        self.insert_link(instructor_id, resource_id, channel_id, Duration::hours(1))
            .await;
    }

    pub async fn add_expired_token_link(
        &self,
        instructor_id: Uuid,
        resource_id: &str,
        channel_id: &str,
    ) {
        self.insert_link(instructor_id, resource_id, channel_id, Duration::hours(-1))
            .await;
    }

    async fn insert_link(
        &self,
        instructor_id: Uuid,
        resource_id: &str,
        channel_id: &str,
        token_ttl: Duration,
    ) {
        let now = OffsetDateTime::now_utc();
        self.links
            .upsert(ExternalCalendarLink {
                instructor_id,
                provider_account_id: "teacher@example.com".to_string(),
                access_token: "mock-access-token".to_string(),
                refresh_token: "mock-refresh-token".to_string(),
                token_expiry: now + token_ttl,
                webhook_channel_id: channel_id.to_string(),
                webhook_resource_id: resource_id.to_string(),
                channel_expiry: now + Duration::days(7),
                created_at: now,
            })
            .await
            .expect("in-memory upsert cannot fail");
    }

    pub async fn all_busy(&self, instructor_id: Uuid) -> Vec<ExternalBusyEvent> {
        self.busy_cache
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.instructor_id == instructor_id)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryTemplateStore {
    items: Mutex<Vec<WeeklyAvailabilityTemplate>>,
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn active_for_day(
        &self,
        instructor_id: Uuid,
        day_of_week: i16,
    ) -> StoreResult<Vec<WeeklyAvailabilityTemplate>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.instructor_id == instructor_id && t.day_of_week == day_of_week && t.active)
            .cloned()
            .collect())
    }

    async fn list(&self, instructor_id: Uuid) -> StoreResult<Vec<WeeklyAvailabilityTemplate>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.instructor_id == instructor_id)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        template: WeeklyAvailabilityTemplate,
    ) -> StoreResult<WeeklyAvailabilityTemplate> {
        self.items.lock().unwrap().push(template.clone());
        Ok(template)
    }

    async fn update(
        &self,
        template: WeeklyAvailabilityTemplate,
    ) -> StoreResult<WeeklyAvailabilityTemplate> {
        let mut items = self.items.lock().unwrap();
        let existing = items
            .iter_mut()
            .find(|t| t.id == template.id && t.instructor_id == template.instructor_id)
            .ok_or(DatabaseError::NotFound)?;
        *existing = template.clone();
        Ok(template)
    }

    async fn delete(&self, instructor_id: Uuid, id: Uuid) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|t| !(t.id == id && t.instructor_id == instructor_id));
        if items.len() == before {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn get(
        &self,
        instructor_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<WeeklyAvailabilityTemplate>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id && t.instructor_id == instructor_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryManualBlockStore {
    items: Mutex<Vec<ManualBlock>>,
}

#[async_trait]
impl ManualBlockStore for InMemoryManualBlockStore {
    async fn create(&self, block: ManualBlock) -> StoreResult<ManualBlock> {
        self.items.lock().unwrap().push(block.clone());
        Ok(block)
    }

    async fn list(&self, instructor_id: Uuid) -> StoreResult<Vec<ManualBlock>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.instructor_id == instructor_id)
            .cloned()
            .collect())
    }

    async fn overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<ManualBlock>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|b| {
                b.instructor_id == instructor_id
                    && Interval::new(b.start_time, b.end_time).overlaps(&window)
            })
            .cloned()
            .collect())
    }

    async fn delete(&self, instructor_id: Uuid, id: Uuid) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|b| !(b.id == id && b.instructor_id == instructor_id));
        if items.len() == before {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBusyCacheStore {
    events: Mutex<Vec<ExternalBusyEvent>>,
}

#[async_trait]
impl BusyCacheStore for InMemoryBusyCacheStore {
    async fn replace(
        &self,
        instructor_id: Uuid,
        events: Vec<ExternalBusyEvent>,
    ) -> StoreResult<()> {
        let mut cached = self.events.lock().unwrap();
        cached.retain(|e| e.instructor_id != instructor_id);
        cached.extend(events);
        Ok(())
    }

    async fn overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<ExternalBusyEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.instructor_id == instructor_id
                    && Interval::new(e.start_time, e.end_time).overlaps(&window)
            })
            .cloned()
            .collect())
    }

    async fn purge(&self, instructor_id: Uuid) -> StoreResult<()> {
        self.events
            .lock()
            .unwrap()
            .retain(|e| e.instructor_id != instructor_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBookingLedger {
    items: Mutex<Vec<BookingRecord>>,
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn insert(&self, booking: BookingRecord) -> StoreResult<BookingRecord> {
        // Check-and-insert under one lock: the analogue of the
        // bookings_no_overlap exclusion constraint.
        let mut items = self.items.lock().unwrap();
        let window = Interval::new(booking.start_time, booking.end_time);
        let collides = items.iter().any(|b| {
            b.instructor_id == booking.instructor_id
                && b.status.is_active()
                && Interval::new(b.start_time, b.end_time).overlaps(&window)
        });
        if collides {
            return Err(DatabaseError::Duplicate);
        }
        items.push(booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn active_overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookingRecord>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|b| {
                b.instructor_id == instructor_id
                    && b.status.is_active()
                    && Interval::new(b.start_time, b.end_time).overlaps(&window)
            })
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<BookingRecord>> {
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|b| b.id == id && b.status == from) {
            Some(booking) => {
                booking.status = to;
                booking.updated_at = OffsetDateTime::now_utc();
                Ok(Some(booking.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set_external_event(
        &self,
        id: Uuid,
        external_event_id: Option<String>,
    ) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap();
        let booking = items
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(DatabaseError::NotFound)?;
        booking.external_event_id = external_event_id;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCalendarLinkStore {
    items: Mutex<Vec<ExternalCalendarLink>>,
}

#[async_trait]
impl CalendarLinkStore for InMemoryCalendarLinkStore {
    async fn upsert(&self, link: ExternalCalendarLink) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap();
        items.retain(|l| l.instructor_id != link.instructor_id);
        items.push(link);
        Ok(())
    }

    async fn get(&self, instructor_id: Uuid) -> StoreResult<Option<ExternalCalendarLink>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.instructor_id == instructor_id)
            .cloned())
    }

    async fn find_by_resource(
        &self,
        resource_id: &str,
    ) -> StoreResult<Option<ExternalCalendarLink>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.webhook_resource_id == resource_id)
            .cloned())
    }

    async fn expiring_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> StoreResult<Vec<ExternalCalendarLink>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.channel_expiry < cutoff)
            .cloned()
            .collect())
    }

    async fn update_channel(
        &self,
        instructor_id: Uuid,
        channel_id: &str,
        resource_id: &str,
        channel_expiry: OffsetDateTime,
    ) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap();
        let link = items
            .iter_mut()
            .find(|l| l.instructor_id == instructor_id)
            .ok_or(DatabaseError::NotFound)?;
        link.webhook_channel_id = channel_id.to_string();
        link.webhook_resource_id = resource_id.to_string();
        link.channel_expiry = channel_expiry;
        Ok(())
    }

    async fn update_tokens(
        &self,
        instructor_id: Uuid,
        access_token: &str,
        token_expiry: OffsetDateTime,
    ) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap();
        let link = items
            .iter_mut()
            .find(|l| l.instructor_id == instructor_id)
            .ok_or(DatabaseError::NotFound)?;
        link.access_token = access_token.to_string();
        link.token_expiry = token_expiry;
        Ok(())
    }

    async fn delete(&self, instructor_id: Uuid) -> StoreResult<()> {
        self.items
            .lock()
            .unwrap()
            .retain(|l| l.instructor_id != instructor_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAppointmentTypeStore {
    items: Mutex<Vec<AppointmentType>>,
}

#[async_trait]
impl AppointmentTypeStore for InMemoryAppointmentTypeStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<AppointmentType>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }
}

/// Scriptable provider double: knobs for transient failures, revoked
/// grants and mirror failures, plus call counters.
#[derive(Default)]
pub struct MockProvider {
    busy: Mutex<Vec<ProviderBusyEvent>>,
    list_busy_count: AtomicUsize,
    create_event_count: AtomicUsize,
    list_busy_failures: AtomicU32,
    grant_revoked: AtomicBool,
    open_channel_fails: AtomicBool,
    create_event_fails: AtomicBool,
    revoke_fails: AtomicBool,
}

impl MockProvider {
    pub fn set_busy(&self, events: Vec<(&str, OffsetDateTime, OffsetDateTime)>) {
        *self.busy.lock().unwrap() = events
            .into_iter()
            .map(|(id, start, end)| ProviderBusyEvent {
                event_id: id.to_string(),
                start,
                end,
            })
            .collect();
    }

    pub fn fail_list_busy_times(&self, n: u32) {
        self.list_busy_failures.store(n, Ordering::SeqCst);
    }

    pub fn revoke_grant(&self) {
        self.grant_revoked.store(true, Ordering::SeqCst);
    }

    pub fn fail_open_channel(&self) {
        self.open_channel_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_create_event(&self) {
        self.create_event_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_revoke(&self) {
        self.revoke_fails.store(true, Ordering::SeqCst);
    }

    pub fn list_busy_calls(&self) -> usize {
        self.list_busy_count.load(Ordering::SeqCst)
    }

    pub fn create_event_calls(&self) -> usize {
        self.create_event_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarProvider for MockProvider {
    async fn exchange_grant(&self, _auth_code: &str) -> Result<GrantExchange, ProviderError> {
        Ok(GrantExchange {
            provider_account_id: "teacher@example.com".to_string(),
            access_token: "mock-access-token".to_string(),
            refresh_token: "mock-refresh-token".to_string(),
            token_expiry: OffsetDateTime::now_utc() + Duration::hours(1),
        })
    }

    async fn refresh_access_token(
        &self,
        _refresh_token: &str,
    ) -> Result<TokenRefresh, ProviderError> {
        if self.grant_revoked.load(Ordering::SeqCst) {
            return Err(ProviderError::AuthRevoked);
        }
        Ok(TokenRefresh {
            access_token: "mock-access-token-2".to_string(),
            token_expiry: OffsetDateTime::now_utc() + Duration::hours(1),
        })
    }

    async fn open_channel(&self, _access_token: &str) -> Result<ChannelLease, ProviderError> {
        if self.open_channel_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                message: "watch unavailable".to_string(),
            });
        }
        let id = Uuid::now_v7();
        Ok(ChannelLease {
            channel_id: format!("chan-{id}"),
            resource_id: format!("res-{id}"),
            expiry: OffsetDateTime::now_utc() + Duration::days(7),
        })
    }

    async fn stop_channel(
        &self,
        _access_token: &str,
        _channel_id: &str,
        _resource_id: &str,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn list_busy(
        &self,
        _access_token: &str,
        _window: Interval,
    ) -> Result<Vec<ProviderBusyEvent>, ProviderError> {
        self.list_busy_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.list_busy_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_busy_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(self.busy.lock().unwrap().clone())
    }

    async fn create_event(
        &self,
        _access_token: &str,
        _summary: &str,
        _window: Interval,
    ) -> Result<String, ProviderError> {
        self.create_event_count.fetch_add(1, Ordering::SeqCst);
        if self.create_event_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                message: "event insert failed".to_string(),
            });
        }
        Ok(format!("mock-event-{}", Uuid::now_v7()))
    }

    async fn delete_event(
        &self,
        _access_token: &str,
        _event_id: &str,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn revoke(&self, _refresh_token: &str) -> Result<(), ProviderError> {
        if self.revoke_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                message: "revocation endpoint failed".to_string(),
            });
        }
        Ok(())
    }
}

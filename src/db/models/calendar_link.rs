use time::OffsetDateTime;
use uuid::Uuid;

/// OAuth link to an instructor's personal calendar, one per instructor.
/// The bridge is the sole owner of this record's lifecycle: created on
/// `connect`, channel fields rewritten on renewal, deleted on
/// `disconnect` or upstream deauthorization.
///
/// Not serializable: it carries provider tokens.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExternalCalendarLink {
    pub instructor_id: Uuid,
    pub provider_account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: OffsetDateTime,
    pub webhook_channel_id: String,
    pub webhook_resource_id: String,
    pub channel_expiry: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl ExternalCalendarLink {
    pub fn token_expired(&self, now: OffsetDateTime) -> bool {
        self.token_expiry <= now
    }
}

/// One cached busy interval pulled from the provider. Rows for an
/// instructor are replaced wholesale on every refresh.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExternalBusyEvent {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub event_id: String,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
}

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::availability::Interval;
use crate::db::models::{ExternalBusyEvent, ExternalCalendarLink};
use crate::db::DatabaseError;
use crate::store::{BusyCacheStore, CalendarLinkStore, StoreResult};

const LINK_COLUMNS: &str = "instructor_id, provider_account_id, access_token, refresh_token, \
     token_expiry, webhook_channel_id, webhook_resource_id, channel_expiry, created_at";

pub struct PgCalendarLinkStore {
    pool: PgPool,
}

impl PgCalendarLinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalendarLinkStore for PgCalendarLinkStore {
    async fn upsert(&self, link: ExternalCalendarLink) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO external_calendar_links
                (instructor_id, provider_account_id, access_token, refresh_token,
                 token_expiry, webhook_channel_id, webhook_resource_id, channel_expiry, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (instructor_id) DO UPDATE SET
                provider_account_id = EXCLUDED.provider_account_id,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                token_expiry = EXCLUDED.token_expiry,
                webhook_channel_id = EXCLUDED.webhook_channel_id,
                webhook_resource_id = EXCLUDED.webhook_resource_id,
                channel_expiry = EXCLUDED.channel_expiry
            "#,
        )
        .bind(link.instructor_id)
        .bind(link.provider_account_id)
        .bind(link.access_token)
        .bind(link.refresh_token)
        .bind(link.token_expiry)
        .bind(link.webhook_channel_id)
        .bind(link.webhook_resource_id)
        .bind(link.channel_expiry)
        .bind(link.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, instructor_id: Uuid) -> StoreResult<Option<ExternalCalendarLink>> {
        let link = sqlx::query_as::<_, ExternalCalendarLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM external_calendar_links WHERE instructor_id = $1"
        ))
        .bind(instructor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(link)
    }

    async fn find_by_resource(
        &self,
        resource_id: &str,
    ) -> StoreResult<Option<ExternalCalendarLink>> {
        let link = sqlx::query_as::<_, ExternalCalendarLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM external_calendar_links WHERE webhook_resource_id = $1"
        ))
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(link)
    }

    async fn expiring_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> StoreResult<Vec<ExternalCalendarLink>> {
        let links = sqlx::query_as::<_, ExternalCalendarLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM external_calendar_links WHERE channel_expiry < $1"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    async fn update_channel(
        &self,
        instructor_id: Uuid,
        channel_id: &str,
        resource_id: &str,
        channel_expiry: OffsetDateTime,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE external_calendar_links
            SET webhook_channel_id = $2, webhook_resource_id = $3, channel_expiry = $4
            WHERE instructor_id = $1
            "#,
        )
        .bind(instructor_id)
        .bind(channel_id)
        .bind(resource_id)
        .bind(channel_expiry)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn update_tokens(
        &self,
        instructor_id: Uuid,
        access_token: &str,
        token_expiry: OffsetDateTime,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE external_calendar_links
            SET access_token = $2, token_expiry = $3
            WHERE instructor_id = $1
            "#,
        )
        .bind(instructor_id)
        .bind(access_token)
        .bind(token_expiry)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, instructor_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM external_calendar_links WHERE instructor_id = $1")
            .bind(instructor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgBusyCacheStore {
    pool: PgPool,
}

impl PgBusyCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusyCacheStore for PgBusyCacheStore {
    async fn replace(
        &self,
        instructor_id: Uuid,
        events: Vec<ExternalBusyEvent>,
    ) -> StoreResult<()> {
        // Swap in one transaction so availability never reads a
        // half-replaced cache.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM external_busy_events WHERE instructor_id = $1")
            .bind(instructor_id)
            .execute(&mut *tx)
            .await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO external_busy_events (id, instructor_id, event_id, start_time, end_time)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.id)
            .bind(event.instructor_id)
            .bind(event.event_id)
            .bind(event.start_time)
            .bind(event.end_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<ExternalBusyEvent>> {
        let events = sqlx::query_as::<_, ExternalBusyEvent>(
            r#"
            SELECT id, instructor_id, event_id, start_time, end_time
            FROM external_busy_events
            WHERE instructor_id = $1 AND start_time < $3 AND end_time > $2
            ORDER BY start_time
            "#,
        )
        .bind(instructor_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn purge(&self, instructor_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM external_busy_events WHERE instructor_id = $1")
            .bind(instructor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

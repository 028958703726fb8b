use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::availability::Interval;
use crate::db::models::{ManualBlock, WeeklyAvailabilityTemplate};
use crate::db::DatabaseError;
use crate::store::{ManualBlockStore, StoreResult, TemplateStore};

const TEMPLATE_COLUMNS: &str =
    "id, instructor_id, day_of_week, start_time, end_time, active, created_at";

pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn active_for_day(
        &self,
        instructor_id: Uuid,
        day_of_week: i16,
    ) -> StoreResult<Vec<WeeklyAvailabilityTemplate>> {
        let templates = sqlx::query_as::<_, WeeklyAvailabilityTemplate>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS}
            FROM weekly_availability_templates
            WHERE instructor_id = $1 AND day_of_week = $2 AND active
            "#
        ))
        .bind(instructor_id)
        .bind(day_of_week)
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn list(&self, instructor_id: Uuid) -> StoreResult<Vec<WeeklyAvailabilityTemplate>> {
        let templates = sqlx::query_as::<_, WeeklyAvailabilityTemplate>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS}
            FROM weekly_availability_templates
            WHERE instructor_id = $1
            ORDER BY day_of_week, start_time
            "#
        ))
        .bind(instructor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn create(
        &self,
        template: WeeklyAvailabilityTemplate,
    ) -> StoreResult<WeeklyAvailabilityTemplate> {
        let created = sqlx::query_as::<_, WeeklyAvailabilityTemplate>(&format!(
            r#"
            INSERT INTO weekly_availability_templates
                (id, instructor_id, day_of_week, start_time, end_time, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(template.id)
        .bind(template.instructor_id)
        .bind(template.day_of_week)
        .bind(template.start_time)
        .bind(template.end_time)
        .bind(template.active)
        .bind(template.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update(
        &self,
        template: WeeklyAvailabilityTemplate,
    ) -> StoreResult<WeeklyAvailabilityTemplate> {
        let updated = sqlx::query_as::<_, WeeklyAvailabilityTemplate>(&format!(
            r#"
            UPDATE weekly_availability_templates
            SET day_of_week = $3, start_time = $4, end_time = $5, active = $6
            WHERE id = $1 AND instructor_id = $2
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(template.id)
        .bind(template.instructor_id)
        .bind(template.day_of_week)
        .bind(template.start_time)
        .bind(template.end_time)
        .bind(template.active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound)?;
        Ok(updated)
    }

    async fn delete(&self, instructor_id: Uuid, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "DELETE FROM weekly_availability_templates WHERE id = $1 AND instructor_id = $2",
        )
        .bind(id)
        .bind(instructor_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn get(
        &self,
        instructor_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<WeeklyAvailabilityTemplate>> {
        let template = sqlx::query_as::<_, WeeklyAvailabilityTemplate>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS}
            FROM weekly_availability_templates
            WHERE id = $1 AND instructor_id = $2
            "#
        ))
        .bind(id)
        .bind(instructor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }
}

pub struct PgManualBlockStore {
    pool: PgPool,
}

impl PgManualBlockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ManualBlockStore for PgManualBlockStore {
    async fn create(&self, block: ManualBlock) -> StoreResult<ManualBlock> {
        let created = sqlx::query_as::<_, ManualBlock>(
            r#"
            INSERT INTO manual_blocks (id, instructor_id, start_time, end_time, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, instructor_id, start_time, end_time, reason, created_at
            "#,
        )
        .bind(block.id)
        .bind(block.instructor_id)
        .bind(block.start_time)
        .bind(block.end_time)
        .bind(block.reason)
        .bind(block.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list(&self, instructor_id: Uuid) -> StoreResult<Vec<ManualBlock>> {
        let blocks = sqlx::query_as::<_, ManualBlock>(
            r#"
            SELECT id, instructor_id, start_time, end_time, reason, created_at
            FROM manual_blocks
            WHERE instructor_id = $1
            ORDER BY start_time
            "#,
        )
        .bind(instructor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(blocks)
    }

    async fn overlapping(
        &self,
        instructor_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<ManualBlock>> {
        // Half-open overlap: [start, end) intersects [window.start, window.end).
        let blocks = sqlx::query_as::<_, ManualBlock>(
            r#"
            SELECT id, instructor_id, start_time, end_time, reason, created_at
            FROM manual_blocks
            WHERE instructor_id = $1 AND start_time < $3 AND end_time > $2
            ORDER BY start_time
            "#,
        )
        .bind(instructor_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(blocks)
    }

    async fn delete(&self, instructor_id: Uuid, id: Uuid) -> StoreResult<()> {
        let result =
            sqlx::query("DELETE FROM manual_blocks WHERE id = $1 AND instructor_id = $2")
                .bind(id)
                .bind(instructor_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}

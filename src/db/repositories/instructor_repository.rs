use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{AppointmentType, Instructor};
use crate::store::{AppointmentTypeStore, InstructorStore, StoreResult};

pub struct PgInstructorStore {
    pool: PgPool,
}

impl PgInstructorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstructorStore for PgInstructorStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Instructor>> {
        let instructor = sqlx::query_as::<_, Instructor>(
            "SELECT id, display_name, api_key, created_at FROM instructors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(instructor)
    }

    async fn find_by_api_key(&self, api_key: &str) -> StoreResult<Option<Instructor>> {
        let instructor = sqlx::query_as::<_, Instructor>(
            "SELECT id, display_name, api_key, created_at FROM instructors WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(instructor)
    }
}

pub struct PgAppointmentTypeStore {
    pool: PgPool,
}

impl PgAppointmentTypeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppointmentTypeStore for PgAppointmentTypeStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<AppointmentType>> {
        let appointment_type = sqlx::query_as::<_, AppointmentType>(
            r#"
            SELECT id, instructor_id, name, duration_minutes, requires_approval, created_at
            FROM appointment_types
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(appointment_type)
    }
}

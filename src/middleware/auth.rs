use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::db::models::Instructor;
use crate::error::AppError;

/// Extractor for instructor-facing endpoints. Resolves the bearer token
/// in the `Authorization` header against the instructor's API key.
pub struct AuthedInstructor(pub Instructor);

#[async_trait]
impl FromRequestParts<AppState> for AuthedInstructor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("missing Authorization header".to_string()))?;

        let api_key = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("expected bearer token".to_string()))?;

        let instructor = state
            .instructors
            .find_by_api_key(api_key)
            .await?
            .ok_or_else(|| AppError::Authentication("unknown API key".to_string()))?;

        Ok(AuthedInstructor(instructor))
    }
}
